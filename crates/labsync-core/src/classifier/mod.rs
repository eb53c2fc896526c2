//! Service classifier
//!
//! Maps a (hostname, address, attribute-bag) tuple to service descriptors
//! using an ordered pattern-rule table.
//!
//! ## Precedence
//!
//! Rules are evaluated in declaration order and **only the first match
//! applies**. A hostname containing both "gitlab" and "api" classifies by
//! whichever token is declared earlier. This is a deliberate precedence
//! policy; reordering the table changes behavior.
//!
//! After rule matching, a second pass overrides the category to
//! [`ServiceCategory::SecureAdmin`] for any hostname containing "admin",
//! independent of rule order.
//!
//! Classification is pure and infallible: malformed input degrades to the
//! default descriptor, never an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use crate::traits::Transport;

/// Category a detected service is rendered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceCategory {
    Web,
    SecuredWeb,
    Api,
    Monitoring,
    Docs,
    SecureAdmin,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::SecuredWeb => "secured-web",
            Self::Api => "api",
            Self::Monitoring => "monitoring",
            Self::Docs => "docs",
            Self::SecureAdmin => "secure-admin",
        }
    }
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "secured-web" | "secured_web" => Ok(Self::SecuredWeb),
            "api" => Ok(Self::Api),
            "monitoring" => Ok(Self::Monitoring),
            "docs" => Ok(Self::Docs),
            "secure-admin" | "secure_admin" | "admin" => Ok(Self::SecureAdmin),
            other => Err(crate::Error::config(format!(
                "unknown service category: {}",
                other
            ))),
        }
    }
}

/// The classifier's typed output: one descriptor renders to exactly one
/// configuration block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub hostname: String,
    pub address: IpAddr,
    pub category: ServiceCategory,
    pub port: u16,
    pub transport: Transport,
}

/// One hostname-pattern rule
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    /// Case-insensitive substring matched against the hostname
    pub match_token: &'static str,
    pub category: ServiceCategory,
    pub default_port: u16,
    pub transport: Transport,
}

impl ClassificationRule {
    const fn new(
        match_token: &'static str,
        category: ServiceCategory,
        default_port: u16,
    ) -> Self {
        Self {
            match_token,
            category,
            default_port,
            transport: Transport::Tcp,
        }
    }
}

/// Attribute-bag key that overrides the matched rule's port
const PORT_ATTRIBUTE: &str = "service_port";

/// Hostname substring that forces the secure-admin category
const ADMIN_TOKEN: &str = "admin";

/// Default descriptor parameters when no rule matches
const DEFAULT_PORT: u16 = 80;

/// Ordered pattern-rule classifier
#[derive(Debug, Clone)]
pub struct ServiceClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for ServiceClassifier {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

impl ServiceClassifier {
    /// Create a classifier with an explicit rule table
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// The built-in rule table, in precedence order
    pub fn default_rules() -> Vec<ClassificationRule> {
        vec![
            ClassificationRule::new("gitlab", ServiceCategory::Web, 80),
            ClassificationRule::new("git", ServiceCategory::Web, 80),
            ClassificationRule::new("netbox", ServiceCategory::Web, 8080),
            ClassificationRule::new("ipam", ServiceCategory::Web, 8080),
            ClassificationRule::new("grafana", ServiceCategory::Monitoring, 3000),
            ClassificationRule::new("prometheus", ServiceCategory::Monitoring, 9090),
            ClassificationRule::new("api", ServiceCategory::Api, 8080),
            ClassificationRule::new("docs", ServiceCategory::Docs, 8000),
            ClassificationRule::new("admin", ServiceCategory::SecureAdmin, 8080),
        ]
    }

    /// Classify one named address into service descriptors
    ///
    /// An absent or empty hostname yields the default descriptor with the
    /// address as the effective hostname.
    pub fn classify(
        &self,
        hostname: Option<&str>,
        address: IpAddr,
        attributes: &HashMap<String, serde_json::Value>,
    ) -> Vec<ServiceDescriptor> {
        let effective_hostname = match hostname {
            Some(h) if !h.trim().is_empty() => h.trim().to_string(),
            _ => address.to_string(),
        };
        let hostname_lower = effective_hostname.to_lowercase();

        let (category, port, transport) = match self
            .rules
            .iter()
            .find(|rule| hostname_lower.contains(rule.match_token))
        {
            Some(rule) => (rule.category, rule.default_port, rule.transport),
            None => (ServiceCategory::Web, DEFAULT_PORT, Transport::Tcp),
        };

        // Second-pass override, independent of rule order
        let category = if hostname_lower.contains(ADMIN_TOKEN) {
            ServiceCategory::SecureAdmin
        } else {
            category
        };

        let port = attribute_port(attributes).unwrap_or(port);

        vec![ServiceDescriptor {
            hostname: effective_hostname,
            address,
            category,
            port,
            transport,
        }]
    }
}

/// Read a `service_port` override from the attribute bag, if present and
/// representable as a port number.
fn attribute_port(attributes: &HashMap<String, serde_json::Value>) -> Option<u16> {
    attributes
        .get(PORT_ATTRIBUTE)
        .and_then(|v| v.as_u64())
        .and_then(|p| u16::try_from(p).ok())
}
