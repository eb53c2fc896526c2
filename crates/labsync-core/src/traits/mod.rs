//! Core traits for the labsync system
//!
//! This module defines the narrow interfaces behind which all external
//! collaborators live. The reconcilers never talk to the network, the DNS
//! server, or the proxy process except through these.
//!
//! - [`InventoryStore`]: IPAM/inventory system (list + idempotent upsert)
//! - [`NameService`]: name-resolution server (idempotent record upsert)
//! - [`NetworkProber`]: host and service discovery
//! - [`ProxyRuntime`]: configuration syntax checker and reload control

pub mod inventory;
pub mod name_service;
pub mod prober;
pub mod proxy;

pub use inventory::{AddressFields, AddressFilter, InventoryEntry, InventoryStore, UpsertOutcome};
pub use name_service::{NameService, RecordKind};
pub use prober::{NetworkProber, ObservedHost, ObservedService, Transport};
pub use proxy::{CheckOutput, ProxyRuntime};
