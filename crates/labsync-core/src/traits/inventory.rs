// # Inventory Store Trait
//
// Defines the interface for the IPAM/inventory collaborator.
//
// ## Implementations
//
// - NetBox-style HTTP API: `labsync-inventory-netbox` crate
// - Future: phpIPAM, plain files, etc.
//
// ## Responsibilities
//
// The inventory store is the system of record for addresses and their DNS
// names. The proxy reconciler reads from it; the discovery reconciler writes
// observed hosts into it. Implementations execute single API calls and
// return typed results; retry and scheduling decisions are owned by the
// reconcilers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;

/// One named, addressed entity as the inventory knows it
#[derive(Debug, Clone)]
pub struct InventoryEntry {
    /// The address, without any prefix-length suffix
    pub address: IpAddr,
    /// DNS name recorded for the address, if any
    pub hostname: Option<String>,
    /// Free-form attribute bag (the inventory's custom fields)
    pub attributes: HashMap<String, serde_json::Value>,
}

/// Filter for listing inventory addresses
#[derive(Debug, Clone)]
pub struct AddressFilter {
    /// Only return entries that carry a DNS name
    pub named_only: bool,
    /// Maximum number of entries to return
    pub limit: usize,
}

impl Default for AddressFilter {
    fn default() -> Self {
        Self {
            named_only: true,
            limit: 1000,
        }
    }
}

/// Fields written by an address upsert
#[derive(Debug, Clone, Default)]
pub struct AddressFields {
    /// DNS name to record for the address
    pub hostname: Option<String>,
    /// Human-readable description
    pub description: Option<String>,
    /// MAC address observed for the host, when the probe could see one
    pub mac_address: Option<String>,
    /// NIC vendor derived from the MAC, when known
    pub vendor: Option<String>,
    /// When the address was last observed on the network
    pub last_seen: Option<DateTime<Utc>>,
}

/// Result of an idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The record did not exist and was created
    Created,
    /// The record existed and was updated
    Updated,
    /// The record already carried these exact fields
    Unchanged,
}

/// Trait for inventory store implementations
///
/// # Idempotency
///
/// `upsert_address` must be keyed by address: calling it twice with
/// identical fields leaves the same final stored state as calling it once,
/// never a duplicate record.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// List active addresses matching the filter
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<InventoryEntry>)`: matching entries (possibly empty)
    /// - `Err(Error)`: the store was unreachable or rejected the request
    async fn list_active_addresses(
        &self,
        filter: &AddressFilter,
    ) -> Result<Vec<InventoryEntry>, crate::Error>;

    /// Create or update the record for an address
    ///
    /// # Parameters
    ///
    /// - `address`: identity key for the record
    /// - `fields`: the fields to write
    async fn upsert_address(
        &self,
        address: IpAddr,
        fields: &AddressFields,
    ) -> Result<UpsertOutcome, crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}
