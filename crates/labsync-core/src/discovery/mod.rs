//! Discovery reconciler
//!
//! The sibling control loop to the proxy reconciler, applied to network
//! facts instead of proxy configuration: scan the target networks, enrich
//! host facts, upsert each observed host into the inventory, and propagate
//! resolved hostnames to the name service.
//!
//! ## Failure policy
//!
//! Partial-failure tolerant throughout: one bad host never blocks the other
//! N-1. Per-host upsert and DNS failures are counted in the cycle report,
//! never propagated. A scan failure for one target network aborts only that
//! target. Cycles are serialized by an internal lock.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::traits::{
    AddressFields, InventoryStore, NameService, NetworkProber, ObservedHost, RecordKind,
};

/// Counters for one discovery cycle; produced once, never mutated after
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub timestamp: Option<DateTime<Utc>>,
    pub networks_scanned: usize,
    pub networks_failed: usize,
    pub hosts_seen: usize,
    pub hosts_upserted: usize,
    pub upsert_failures: usize,
    pub dns_synced: usize,
    pub dns_failures: usize,
    pub services_discovered: usize,
    pub duration_ms: u64,
}

impl DiscoveryReport {
    /// Whether any per-item failure was recorded
    pub fn has_partial_failures(&self) -> bool {
        self.upsert_failures > 0 || self.dns_failures > 0 || self.networks_failed > 0
    }
}

/// Reconciler converging inventory and DNS toward observed network state
pub struct DiscoveryReconciler {
    prober: Arc<dyn NetworkProber>,
    inventory: Arc<dyn InventoryStore>,
    /// Optional: discovery still runs without hostname propagation
    names: Option<Arc<dyn NameService>>,
    config: DiscoveryConfig,
    scan_timeout: Duration,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl DiscoveryReconciler {
    pub fn new(
        prober: Arc<dyn NetworkProber>,
        inventory: Arc<dyn InventoryStore>,
        names: Option<Arc<dyn NameService>>,
        config: DiscoveryConfig,
    ) -> Self {
        let scan_timeout = Duration::from_secs(config.scan_timeout_secs);
        Self {
            prober,
            inventory,
            names,
            config,
            scan_timeout,
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one discovery cycle over all configured target networks
    pub async fn run_cycle(&self) -> Result<DiscoveryReport> {
        let _guard = self.cycle_lock.lock().await;
        let started = Instant::now();

        let mut report = DiscoveryReport {
            timestamp: Some(Utc::now()),
            ..DiscoveryReport::default()
        };

        for network in &self.config.networks {
            info!(network, prober = self.prober.prober_name(), "scanning network");

            let hosts = match tokio::time::timeout(self.scan_timeout, self.prober.scan(network))
                .await
            {
                Ok(Ok(hosts)) => hosts,
                Ok(Err(e)) => {
                    // This target failed; the remaining networks still run.
                    warn!(network, "network scan failed: {}", e);
                    report.networks_failed += 1;
                    continue;
                }
                Err(_) => {
                    warn!(network, "network scan timed out after {:?}", self.scan_timeout);
                    report.networks_failed += 1;
                    continue;
                }
            };

            report.networks_scanned += 1;
            info!(network, hosts = hosts.len(), "network scan complete");

            for host in hosts {
                self.process_host(host, &mut report).await;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            hosts = report.hosts_seen,
            upserted = report.hosts_upserted,
            dns_synced = report.dns_synced,
            upsert_failures = report.upsert_failures,
            dns_failures = report.dns_failures,
            duration_ms = report.duration_ms,
            "discovery cycle complete"
        );

        Ok(report)
    }

    /// Enrich, upsert, and propagate one observed host
    ///
    /// Failures land in the report counters; this never returns an error.
    async fn process_host(&self, mut host: ObservedHost, report: &mut DiscoveryReport) {
        report.hosts_seen += 1;

        // Deep service scan only for allow-listed infrastructure addresses
        if self.config.service_scan_hosts.contains(&host.address) {
            match self.prober.scan_services(host.address).await {
                Ok(services) => {
                    report.services_discovered += services.len();
                    host.services = services;
                }
                Err(e) => {
                    debug!(address = %host.address, "service scan failed: {}", e);
                }
            }
        }

        let fields = AddressFields {
            hostname: host.hostname.clone(),
            description: Some(format!(
                "Auto-discovered on {}",
                host.last_seen.format("%Y-%m-%d")
            )),
            mac_address: host.mac_address.clone(),
            vendor: host.vendor.clone(),
            last_seen: Some(host.last_seen),
        };

        match self.inventory.upsert_address(host.address, &fields).await {
            Ok(outcome) => {
                debug!(address = %host.address, ?outcome, "inventory upsert");
                report.hosts_upserted += 1;
            }
            Err(e) => {
                warn!(address = %host.address, "inventory upsert failed: {}", e);
                report.upsert_failures += 1;
                // Keep going: DNS propagation does not depend on the upsert
            }
        }

        if let (Some(names), Some(hostname)) = (&self.names, &host.hostname) {
            let record_name = record_name_for(hostname, &self.config.zone);
            let kind = RecordKind::for_address(host.address);

            match names
                .upsert_record(
                    &self.config.zone,
                    &record_name,
                    kind,
                    host.address,
                    self.config.record_ttl,
                )
                .await
            {
                Ok(_) => {
                    debug!(name = record_name, address = %host.address, "DNS record synced");
                    report.dns_synced += 1;
                }
                Err(e) => {
                    warn!(name = record_name, "DNS sync failed: {}", e);
                    report.dns_failures += 1;
                }
            }
        }
    }
}

/// Fully-qualified record name for a resolved hostname
///
/// Only the first label of the observed name is kept; the configured zone
/// supplies the rest.
fn record_name_for(hostname: &str, zone: &str) -> String {
    let label = hostname.split('.').next().unwrap_or(hostname);
    if zone.is_empty() {
        label.to_string()
    } else {
        format!("{}.{}", label, zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_name_uses_first_label_and_zone() {
        assert_eq!(
            record_name_for("nas.local.lan", "lab.example"),
            "nas.lab.example"
        );
        assert_eq!(record_name_for("nas", "lab.example"), "nas.lab.example");
        assert_eq!(record_name_for("nas.lan", ""), "nas");
    }
}
