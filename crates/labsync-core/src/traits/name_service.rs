// # Name Service Trait
//
// Defines the interface for the name-resolution collaborator.
//
// ## Implementations
//
// - Technitium-style HTTP API: `labsync-dns-technitium` crate
//
// Implementations execute a single API call per invocation. The discovery
// reconciler decides which records to propagate and tolerates per-record
// failures; implementations only report success or failure.

use async_trait::async_trait;
use std::net::IpAddr;

use super::inventory::UpsertOutcome;

/// Address record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
}

impl RecordKind {
    /// The record kind matching an address family
    pub fn for_address(address: IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => Self::A,
            IpAddr::V6(_) => Self::Aaaa,
        }
    }

    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
        }
    }
}

/// Trait for name service implementations
///
/// # Idempotency
///
/// `upsert_record` is keyed by fully-qualified name: repeating a call with
/// identical fields must not create duplicate records.
#[async_trait]
pub trait NameService: Send + Sync {
    /// Create or overwrite an address record
    ///
    /// # Parameters
    ///
    /// - `zone`: the zone the record belongs to
    /// - `name`: fully-qualified record name within the zone
    /// - `kind`: A or AAAA
    /// - `address`: the address to point at
    /// - `ttl`: record time-to-live in seconds
    async fn upsert_record(
        &self,
        zone: &str,
        name: &str,
        kind: RecordKind,
        address: IpAddr,
        ttl: u32,
    ) -> Result<UpsertOutcome, crate::Error>;

    /// Get the service name (for logging/debugging)
    fn service_name(&self) -> &'static str;
}
