//! Configuration types for the labsync system
//!
//! One immutable `SyncConfig` is constructed at startup (typically from
//! environment variables in the daemon) and handed to each component.
//! No component reads ambient global state directly.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Main labsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base DNS domain appended to unqualified hostnames (e.g. "lab.example")
    pub base_domain: String,

    /// Proxy configuration paths and timeouts
    pub proxy: ProxyConfig,

    /// Discovery cycle settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.base_domain.is_empty() {
            return Err(crate::Error::config("base_domain cannot be empty"));
        }
        if self.base_domain.starts_with('.') || self.base_domain.ends_with('.') {
            return Err(crate::Error::config(format!(
                "base_domain must not have a leading or trailing dot: {}",
                self.base_domain
            )));
        }
        self.proxy.validate()?;
        self.discovery.validate()?;
        Ok(())
    }
}

/// Active configuration and backup layout for the proxy reconciler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Path of the active configuration file (e.g. "/opt/caddy/Caddyfile")
    pub active_config_path: PathBuf,

    /// Directory holding timestamped backup copies
    pub backup_dir: PathBuf,

    /// Maximum number of backups retained; oldest evicted first
    #[serde(default = "default_backup_keep")]
    pub backup_keep: usize,

    /// Bound on a single syntax-check invocation (seconds)
    #[serde(default = "default_validate_timeout_secs")]
    pub validate_timeout_secs: u64,

    /// Bound on a single reload invocation (seconds)
    #[serde(default = "default_reload_timeout_secs")]
    pub reload_timeout_secs: u64,
}

impl ProxyConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.active_config_path.as_os_str().is_empty() {
            return Err(crate::Error::config("active_config_path cannot be empty"));
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(crate::Error::config("backup_dir cannot be empty"));
        }
        if self.backup_keep == 0 {
            return Err(crate::Error::config("backup_keep must be >= 1"));
        }
        Ok(())
    }
}

/// Discovery cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Target networks to scan, in CIDR notation (e.g. "10.203.0.0/16")
    #[serde(default)]
    pub networks: Vec<String>,

    /// DNS zone that discovered hostnames are propagated into
    #[serde(default)]
    pub zone: String,

    /// TTL for propagated address records (seconds)
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,

    /// Addresses that receive a deep service scan in addition to the host
    /// sweep. Explicit allow-list (gateways, known infrastructure hosts).
    #[serde(default)]
    pub service_scan_hosts: Vec<IpAddr>,

    /// Bound on a single network scan (seconds)
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
}

impl DiscoveryConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        for network in &self.networks {
            if network.is_empty() {
                return Err(crate::Error::config("discovery network cannot be empty"));
            }
        }
        if self.record_ttl == 0 {
            return Err(crate::Error::config("record_ttl must be >= 1"));
        }
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            networks: Vec::new(),
            zone: String::new(),
            record_ttl: default_record_ttl(),
            service_scan_hosts: Vec::new(),
            scan_timeout_secs: default_scan_timeout_secs(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum in-cycle retry attempts for the inventory fetch
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: usize,

    /// Delay between fetch retries (seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Bound on a single inventory fetch (seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Capacity of the reconciler event channel
    ///
    /// When full, new events are dropped with a warning. This prevents
    /// unbounded memory growth when nobody drains the receiver.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_retries: default_fetch_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_backup_keep() -> usize {
    20
}

fn default_validate_timeout_secs() -> u64 {
    30
}

fn default_reload_timeout_secs() -> u64 {
    30
}

fn default_record_ttl() -> u32 {
    300
}

fn default_scan_timeout_secs() -> u64 {
    120
}

fn default_fetch_retries() -> usize {
    2
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SyncConfig {
        SyncConfig {
            base_domain: "lab.example".to_string(),
            proxy: ProxyConfig {
                active_config_path: PathBuf::from("/opt/caddy/Caddyfile"),
                backup_dir: PathBuf::from("/opt/caddy/backups"),
                backup_keep: default_backup_keep(),
                validate_timeout_secs: default_validate_timeout_secs(),
                reload_timeout_secs: default_reload_timeout_secs(),
            },
            discovery: DiscoveryConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn empty_domain_is_rejected() {
        let mut cfg = minimal();
        cfg.base_domain = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_backup_cap_is_rejected() {
        let mut cfg = minimal();
        cfg.proxy.backup_keep = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn trailing_dot_domain_is_rejected() {
        let mut cfg = minimal();
        cfg.base_domain = "lab.example.".to_string();
        assert!(cfg.validate().is_err());
    }
}
