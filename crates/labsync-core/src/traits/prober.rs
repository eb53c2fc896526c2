// # Network Prober Trait
//
// Defines the interface for host and service discovery.
//
// ## Implementations
//
// - nmap subprocess: `labsync-probe-nmap` crate
//
// ## Lifecycle of observed data
//
// `ObservedHost` and `ObservedService` exist only within one discovery
// cycle: built by the prober, consumed by the discovery reconciler,
// discarded once the report is produced. Persistence is the inventory
// collaborator's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Transport protocol of an observed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// One open service observed on a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedService {
    pub port: u16,
    pub transport: Transport,
    /// Service name as reported by the scanner (e.g. "http", "ssh")
    pub name: Option<String>,
    /// Product banner, if fingerprinted
    pub product: Option<String>,
    /// Product version, if fingerprinted
    pub version: Option<String>,
}

/// One host observed during a discovery cycle
///
/// Identity key is the address; everything else is best-effort enrichment.
#[derive(Debug, Clone)]
pub struct ObservedHost {
    pub address: IpAddr,
    /// Reverse-resolved hostname, if any
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    /// NIC vendor derived from the MAC OUI, if known
    pub vendor: Option<String>,
    /// Open services, in scan order
    pub services: Vec<ObservedService>,
    pub last_seen: DateTime<Utc>,
}

impl ObservedHost {
    /// Create a bare observation for an address seen just now
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            hostname: None,
            mac_address: None,
            vendor: None,
            services: Vec::new(),
            last_seen: Utc::now(),
        }
    }
}

/// Trait for network prober implementations
///
/// Implementations perform one scan per invocation and must be
/// cancellation-safe: dropping the future must not leave stray processes
/// beyond their own timeout handling.
#[async_trait]
pub trait NetworkProber: Send + Sync {
    /// Sweep a target network for live hosts
    ///
    /// # Parameters
    ///
    /// - `target`: network in CIDR notation (e.g. "10.203.0.0/24")
    async fn scan(&self, target: &str) -> Result<Vec<ObservedHost>, crate::Error>;

    /// Deep-scan one host for open services
    async fn scan_services(&self, address: IpAddr) -> Result<Vec<ObservedService>, crate::Error>;

    /// Get the prober name (for logging/debugging)
    fn prober_name(&self) -> &'static str;
}
