//! Test doubles and common utilities for the contract tests
//!
//! The mocks track calls and keep their stored state behind shared Arcs so
//! tests can hold a handle while the reconciler owns another clone.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use labsync_core::config::{DiscoveryConfig, EngineConfig, ProxyConfig, SyncConfig};
use labsync_core::error::{Error, Result};
use labsync_core::traits::{
    AddressFields, AddressFilter, CheckOutput, InventoryEntry, InventoryStore, NameService,
    NetworkProber, ObservedHost, ObservedService, ProxyRuntime, RecordKind, UpsertOutcome,
};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build an inventory entry with a hostname and empty attributes
pub fn entry(address: &str, hostname: &str) -> InventoryEntry {
    InventoryEntry {
        address: address.parse().unwrap(),
        hostname: Some(hostname.to_string()),
        attributes: HashMap::new(),
    }
}

/// Build an observed host with an optional hostname
pub fn observed(address: &str, hostname: Option<&str>) -> ObservedHost {
    ObservedHost {
        address: address.parse().unwrap(),
        hostname: hostname.map(|h| h.to_string()),
        mac_address: None,
        vendor: None,
        services: Vec::new(),
        last_seen: Utc::now(),
    }
}

/// SyncConfig pointed at paths inside a test directory
pub fn test_config(dir: &Path) -> SyncConfig {
    SyncConfig {
        base_domain: "lab.example".to_string(),
        proxy: ProxyConfig {
            active_config_path: dir.join("Caddyfile"),
            backup_dir: dir.join("backups"),
            backup_keep: 20,
            validate_timeout_secs: 5,
            reload_timeout_secs: 5,
        },
        discovery: DiscoveryConfig::default(),
        engine: EngineConfig {
            fetch_retries: 0,
            retry_delay_secs: 0,
            fetch_timeout_secs: 5,
            event_channel_capacity: 100,
        },
    }
}

/// A mock inventory store with keyed, idempotent upserts
#[derive(Clone)]
pub struct MockInventory {
    /// Entries returned by list_active_addresses
    entries: Arc<Mutex<Vec<InventoryEntry>>>,
    /// When true, listing fails with a connectivity-style error
    fail_list: Arc<Mutex<bool>>,
    /// Addresses whose upsert fails
    fail_upserts: Arc<Mutex<HashSet<IpAddr>>>,
    /// Stored records, keyed by address
    stored: Arc<Mutex<HashMap<IpAddr, AddressFields>>>,
    list_calls: Arc<AtomicUsize>,
    upsert_calls: Arc<AtomicUsize>,
}

impl MockInventory {
    pub fn new(entries: Vec<InventoryEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
            fail_list: Arc::new(Mutex::new(false)),
            fail_upserts: Arc::new(Mutex::new(HashSet::new())),
            stored: Arc::new(Mutex::new(HashMap::new())),
            list_calls: Arc::new(AtomicUsize::new(0)),
            upsert_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn set_fail_list(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    pub fn fail_upsert_for(&self, address: &str) {
        self.fail_upserts
            .lock()
            .unwrap()
            .insert(address.parse().unwrap());
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }

    pub fn stored_hostname(&self, address: &str) -> Option<String> {
        let address: IpAddr = address.parse().unwrap();
        self.stored
            .lock()
            .unwrap()
            .get(&address)
            .and_then(|f| f.hostname.clone())
    }

    pub fn stored_fields(&self, address: &str) -> Option<AddressFields> {
        let address: IpAddr = address.parse().unwrap();
        self.stored.lock().unwrap().get(&address).cloned()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_call_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryStore for MockInventory {
    async fn list_active_addresses(&self, _filter: &AddressFilter) -> Result<Vec<InventoryEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_list.lock().unwrap() {
            return Err(Error::inventory("inventory unreachable"));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn upsert_address(
        &self,
        address: IpAddr,
        fields: &AddressFields,
    ) -> Result<UpsertOutcome> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.lock().unwrap().contains(&address) {
            return Err(Error::inventory(format!("upsert rejected for {}", address)));
        }

        let mut stored = self.stored.lock().unwrap();
        match stored.get(&address) {
            Some(existing) if existing.hostname == fields.hostname => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                stored.insert(address, fields.clone());
                Ok(UpsertOutcome::Updated)
            }
            None => {
                stored.insert(address, fields.clone());
                Ok(UpsertOutcome::Created)
            }
        }
    }

    fn store_name(&self) -> &'static str {
        "mock-inventory"
    }
}

/// A mock name service with keyed, idempotent record upserts
#[derive(Clone)]
pub struct MockNameService {
    records: Arc<Mutex<HashMap<String, (IpAddr, u32)>>>,
    fail_names: Arc<Mutex<HashSet<String>>>,
    upsert_calls: Arc<AtomicUsize>,
}

impl MockNameService {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            fail_names: Arc::new(Mutex::new(HashSet::new())),
            upsert_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_for(&self, name: &str) {
        self.fail_names.lock().unwrap().insert(name.to_string());
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn record(&self, name: &str) -> Option<(IpAddr, u32)> {
        self.records.lock().unwrap().get(name).copied()
    }

    pub fn upsert_call_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameService for MockNameService {
    async fn upsert_record(
        &self,
        _zone: &str,
        name: &str,
        _kind: RecordKind,
        address: IpAddr,
        ttl: u32,
    ) -> Result<UpsertOutcome> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_names.lock().unwrap().contains(name) {
            return Err(Error::name_service(format!("refused record {}", name)));
        }

        let mut records = self.records.lock().unwrap();
        match records.get(name) {
            Some(&existing) if existing == (address, ttl) => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                records.insert(name.to_string(), (address, ttl));
                Ok(UpsertOutcome::Updated)
            }
            None => {
                records.insert(name.to_string(), (address, ttl));
                Ok(UpsertOutcome::Created)
            }
        }
    }

    fn service_name(&self) -> &'static str {
        "mock-dns"
    }
}

/// A mock prober serving canned scan results per target network
#[derive(Clone)]
pub struct MockProber {
    hosts_by_network: Arc<Mutex<HashMap<String, Vec<ObservedHost>>>>,
    fail_networks: Arc<Mutex<HashSet<String>>>,
    services_by_address: Arc<Mutex<HashMap<IpAddr, Vec<ObservedService>>>>,
}

impl MockProber {
    pub fn new() -> Self {
        Self {
            hosts_by_network: Arc::new(Mutex::new(HashMap::new())),
            fail_networks: Arc::new(Mutex::new(HashSet::new())),
            services_by_address: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_hosts(self, network: &str, hosts: Vec<ObservedHost>) -> Self {
        self.hosts_by_network
            .lock()
            .unwrap()
            .insert(network.to_string(), hosts);
        self
    }

    pub fn fail_network(&self, network: &str) {
        self.fail_networks
            .lock()
            .unwrap()
            .insert(network.to_string());
    }

    pub fn serve_services(&self, address: &str, services: Vec<ObservedService>) {
        self.services_by_address
            .lock()
            .unwrap()
            .insert(address.parse().unwrap(), services);
    }
}

#[async_trait]
impl NetworkProber for MockProber {
    async fn scan(&self, target: &str) -> Result<Vec<ObservedHost>> {
        if self.fail_networks.lock().unwrap().contains(target) {
            return Err(Error::prober(format!("scan failed for {}", target)));
        }
        Ok(self
            .hosts_by_network
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_default())
    }

    async fn scan_services(&self, address: IpAddr) -> Result<Vec<ObservedService>> {
        Ok(self
            .services_by_address
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    fn prober_name(&self) -> &'static str {
        "mock-prober"
    }
}

/// A scripted proxy runtime with independently switchable check and reload
#[derive(Clone)]
pub struct ScriptedRuntime {
    check_ok: Arc<Mutex<bool>>,
    reload_ok: Arc<Mutex<bool>>,
    check_calls: Arc<AtomicUsize>,
    reload_calls: Arc<AtomicUsize>,
    reload_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self {
            check_ok: Arc::new(Mutex::new(true)),
            reload_ok: Arc::new(Mutex::new(true)),
            check_calls: Arc::new(AtomicUsize::new(0)),
            reload_calls: Arc::new(AtomicUsize::new(0)),
            reload_paths: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn reject_config(&self) {
        *self.check_ok.lock().unwrap() = false;
    }

    pub fn fail_reload(&self) {
        *self.reload_ok.lock().unwrap() = false;
    }

    pub fn check_call_count(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn reload_call_count(&self) -> usize {
        self.reload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyRuntime for ScriptedRuntime {
    async fn check_config(&self, _path: &Path) -> Result<CheckOutput> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if *self.check_ok.lock().unwrap() {
            Ok(CheckOutput::ok())
        } else {
            Ok(CheckOutput::failed("adapting caddyfile: syntax error"))
        }
    }

    async fn reload(&self, path: &Path) -> Result<CheckOutput> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        self.reload_paths.lock().unwrap().push(path.to_path_buf());
        if *self.reload_ok.lock().unwrap() {
            Ok(CheckOutput::ok())
        } else {
            Ok(CheckOutput::failed("connection refused: admin endpoint"))
        }
    }

    fn runtime_name(&self) -> &'static str {
        "scripted"
    }
}
