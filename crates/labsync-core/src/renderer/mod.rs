//! Config renderer
//!
//! Turns a list of [`ServiceDescriptor`] values into one proxy configuration
//! document using per-category templates.
//!
//! Templates are pure string transforms: no I/O, no external calls, fully
//! deterministic given inputs. The same descriptor order produces
//! byte-identical blocks, which is what the contract tests diff against.
//!
//! The header is regenerated on every call and carries the generation
//! timestamp; a header change alone is not a content change. Callers doing
//! idempotence checks must compare [`ConfigDocument::blocks_text`], never
//! the full document.

use chrono::Utc;

use crate::classifier::{ServiceCategory, ServiceDescriptor};

/// Substitution markers understood by the templates.
///
/// These deliberately do not collide with the proxy's own runtime
/// placeholders (`{upstream_hostport}`, `{remote_host}`, ...), which pass
/// through untouched.
const HOSTNAME_MARKER: &str = "{hostname}";
const ADDRESS_MARKER: &str = "{address}";
const PORT_MARKER: &str = "{port}";
const SERVICE_MARKER: &str = "{service}";

const WEB_TEMPLATE: &str = r#"{hostname} {
    tls {
        dns cloudflare {env.CLOUDFLARE_API_TOKEN}
    }
    reverse_proxy {address}:{port} {
        header_up Host {upstream_hostport}
        header_up X-Real-IP {remote_host}
        header_up X-Forwarded-For {remote_host}
        header_up X-Forwarded-Proto {scheme}
    }
    encode gzip
    log {
        output file /var/log/caddy/{service}-access.log
        format json
    }
}"#;

const API_TEMPLATE: &str = r#"{hostname} {
    tls {
        dns cloudflare {env.CLOUDFLARE_API_TOKEN}
    }
    reverse_proxy {address}:{port} {
        header_up Host {upstream_hostport}
        header_up X-Real-IP {remote_host}
        header_up X-Forwarded-For {remote_host}
        header_up X-Forwarded-Proto {scheme}
    }
    header {
        Access-Control-Allow-Origin *
        Access-Control-Allow-Methods "GET, POST, PUT, DELETE, OPTIONS"
        Access-Control-Allow-Headers "Content-Type, Authorization"
    }
    encode gzip
}"#;

const SECURE_TEMPLATE: &str = r#"{hostname} {
    tls {
        dns cloudflare {env.CLOUDFLARE_API_TOKEN}
    }
    reverse_proxy {address}:{port} {
        header_up Host {upstream_hostport}
        header_up X-Real-IP {remote_host}
        header_up X-Forwarded-For {remote_host}
        header_up X-Forwarded-Proto {scheme}
    }
    header {
        Strict-Transport-Security "max-age=31536000; includeSubDomains; preload"
        X-Frame-Options DENY
        X-Content-Type-Options nosniff
        X-XSS-Protection "1; mode=block"
        Content-Security-Policy "default-src 'self'"
    }
    encode gzip
}"#;

/// One rendered configuration document
///
/// Concatenation is deterministic and order-preserving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    header: String,
    blocks: Vec<String>,
}

impl ConfigDocument {
    /// Full document text: header followed by blocks in input order
    pub fn to_config_text(&self) -> String {
        let mut text = self.header.clone();
        text.push_str(&self.blocks.join("\n"));
        text.push('\n');
        text
    }

    /// Blocks only, for content comparison (header excluded)
    pub fn blocks_text(&self) -> String {
        self.blocks.join("\n")
    }

    /// The rendered blocks, in input order
    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

/// Per-category template renderer
#[derive(Debug, Clone)]
pub struct ConfigRenderer {
    base_domain: String,
}

impl ConfigRenderer {
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
        }
    }

    /// Render descriptors into one document, blocks in input order
    pub fn render(&self, descriptors: &[ServiceDescriptor]) -> ConfigDocument {
        let blocks = descriptors
            .iter()
            .map(|d| self.render_block(d))
            .collect();

        ConfigDocument {
            header: self.render_header(),
            blocks,
        }
    }

    /// Render one descriptor into one configuration block
    fn render_block(&self, descriptor: &ServiceDescriptor) -> String {
        let hostname = self.qualify_hostname(&descriptor.hostname);
        // Short label for the access-log file name
        let service = descriptor
            .hostname
            .split('.')
            .next()
            .unwrap_or(&descriptor.hostname)
            .to_string();

        template_for(descriptor.category)
            .replace(HOSTNAME_MARKER, &hostname)
            .replace(ADDRESS_MARKER, &descriptor.address.to_string())
            .replace(PORT_MARKER, &descriptor.port.to_string())
            .replace(SERVICE_MARKER, &service)
    }

    /// Append the base domain iff the hostname has no dot and does not
    /// already end with the domain.
    pub fn qualify_hostname(&self, hostname: &str) -> String {
        if hostname.ends_with(&format!(".{}", self.base_domain)) || hostname == self.base_domain {
            return hostname.to_string();
        }
        if hostname.contains('.') {
            return hostname.to_string();
        }
        format!("{}.{}", hostname, self.base_domain)
    }

    fn render_header(&self) -> String {
        [
            format!("# Auto-generated Caddyfile - {}", Utc::now().to_rfc3339()),
            "# Generated by labsync".to_string(),
            "# DO NOT EDIT MANUALLY - Changes will be overwritten".to_string(),
            String::new(),
            "{".to_string(),
            format!("    email admin@{}", self.base_domain),
            "    auto_https on".to_string(),
            "}".to_string(),
            String::new(),
            String::new(),
        ]
        .join("\n")
    }
}

/// Template lookup; categories without a dedicated template render as web.
fn template_for(category: ServiceCategory) -> &'static str {
    match category {
        ServiceCategory::Web => WEB_TEMPLATE,
        ServiceCategory::Api => API_TEMPLATE,
        ServiceCategory::SecureAdmin => SECURE_TEMPLATE,
        ServiceCategory::SecuredWeb | ServiceCategory::Monitoring | ServiceCategory::Docs => {
            WEB_TEMPLATE
        }
    }
}
