//! Proxy reconciler
//!
//! Orchestrates one full convergence pass from observed inventory state to
//! active proxy configuration:
//!
//! ```text
//! Idle → Fetching → Classifying → Rendering → Validating
//!      → { Applying | Skipped } → Activating → { Done | RollingBack } → Idle
//! ```
//!
//! ## Invariants
//!
//! - Stages are strictly sequential within a cycle; cycles are serialized by
//!   an internal lock, so at most one application is ever in flight.
//! - A failed validation leaves the active configuration byte-identical.
//! - A timestamped backup is taken before every write; if the backup cannot
//!   be created, the cycle aborts before touching the active file.
//! - A failed activation restores the backup over the active path. If the
//!   backup itself is unreadable, that is a fatal condition surfaced to the
//!   operator, never swallowed.
//! - Shutdown is honored at stage boundaries only; once Apply has begun the
//!   write/activate pair runs to completion or rollback.
//!
//! The reconciler exclusively owns the active configuration file and the
//! backup directory. No other component writes them.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::classifier::{ServiceCategory, ServiceClassifier, ServiceDescriptor};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::renderer::ConfigRenderer;
use crate::traits::{AddressFilter, InventoryEntry, InventoryStore, ProxyRuntime, Transport};
use crate::validator::ConfigValidator;

/// Terminal status of one reconciliation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// New configuration validated, written, and activated
    Applied,
    /// Candidate rejected (or backup could not be taken); disk untouched
    ValidationFailed,
    /// Reload failed after a valid write; backup restored
    ActivationFailedRolledBack,
    /// Inventory returned no named addresses; nothing to do
    NoServices,
}

/// Produced once per cycle; never mutated after construction
#[derive(Debug, Clone)]
pub struct ReconciliationResult {
    pub status: CycleStatus,
    pub service_count: usize,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ReconciliationResult {
    fn finish(status: CycleStatus, service_count: usize, timestamp: DateTime<Utc>, started: Instant) -> Self {
        Self {
            status,
            service_count,
            timestamp,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Events emitted by the reconciler for external monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerEvent {
    /// A cycle entered the Fetching stage
    CycleStarted,
    /// The candidate was rejected by the checker
    ValidationRejected { diagnostics: String },
    /// New configuration is live
    Applied { service_count: usize },
    /// The previous configuration was restored
    RolledBack { reason: String },
    /// The inventory had nothing to render
    NoServices,
}

/// Reconciler converging the proxy configuration toward inventory state
pub struct ProxyReconciler {
    inventory: Arc<dyn InventoryStore>,
    runtime: Arc<dyn ProxyRuntime>,
    classifier: ServiceClassifier,
    renderer: ConfigRenderer,
    validator: ConfigValidator,

    /// The active configuration file, exclusively owned by this reconciler
    active_path: PathBuf,
    backup_dir: PathBuf,
    backup_keep: usize,

    fetch_timeout: Duration,
    fetch_retries: usize,
    retry_delay: Duration,
    reload_timeout: Duration,

    /// Serializes cycles; at most one application in flight
    cycle_lock: tokio::sync::Mutex<()>,

    event_tx: mpsc::Sender<ReconcilerEvent>,
}

impl ProxyReconciler {
    /// Create a reconciler from collaborators and configuration
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver); the receiver yields
    /// [`ReconcilerEvent`] values for logging or monitoring.
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        runtime: Arc<dyn ProxyRuntime>,
        config: &SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<ReconcilerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let validator = ConfigValidator::new(
            runtime.clone(),
            Duration::from_secs(config.proxy.validate_timeout_secs),
        );

        let reconciler = Self {
            inventory,
            runtime,
            classifier: ServiceClassifier::default(),
            renderer: ConfigRenderer::new(config.base_domain.clone()),
            validator,
            active_path: config.proxy.active_config_path.clone(),
            backup_dir: config.proxy.backup_dir.clone(),
            backup_keep: config.proxy.backup_keep,
            fetch_timeout: Duration::from_secs(config.engine.fetch_timeout_secs),
            fetch_retries: config.engine.fetch_retries,
            retry_delay: Duration::from_secs(config.engine.retry_delay_secs),
            reload_timeout: Duration::from_secs(config.proxy.reload_timeout_secs),
            cycle_lock: tokio::sync::Mutex::new(()),
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Run one reconciliation cycle
    pub async fn run_cycle(&self) -> Result<ReconciliationResult> {
        self.run_cycle_with_shutdown(None).await
    }

    /// Run one cycle with a cooperative shutdown signal
    ///
    /// The signal is checked between stages only; a cycle that has started
    /// applying runs to completion or rollback before the signal is honored.
    pub async fn run_cycle_with_shutdown(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<ReconciliationResult> {
        let _guard = self.cycle_lock.lock().await;
        let started = Instant::now();
        let timestamp = Utc::now();

        self.emit(ReconcilerEvent::CycleStarted);

        if shutdown_requested(shutdown) {
            return Err(Error::Other("shutdown requested before fetch".to_string()));
        }

        let entries = self.fetch_entries().await?;
        if entries.is_empty() {
            info!("inventory returned no named addresses, nothing to reconcile");
            self.emit(ReconcilerEvent::NoServices);
            return Ok(ReconciliationResult::finish(
                CycleStatus::NoServices,
                0,
                timestamp,
                started,
            ));
        }

        let descriptors = self.classify_entries(&entries);
        debug!(
            entries = entries.len(),
            descriptors = descriptors.len(),
            "classified inventory entries"
        );

        self.apply_descriptors(descriptors, shutdown, timestamp, started)
            .await
    }

    /// Insert one ad hoc service and converge immediately
    ///
    /// The descriptor is merged into the freshly fetched set and the
    /// Render → Validate → Apply → Activate pipeline runs under the same
    /// cycle lock as scheduled cycles.
    pub async fn add_service(
        &self,
        hostname: &str,
        address: IpAddr,
        port: u16,
        category: ServiceCategory,
    ) -> Result<ReconciliationResult> {
        let _guard = self.cycle_lock.lock().await;
        let started = Instant::now();
        let timestamp = Utc::now();

        info!(hostname, %address, port, %category, "adding service manually");

        let entries = self.fetch_entries().await?;
        let mut descriptors = self.classify_entries(&entries);
        descriptors.push(ServiceDescriptor {
            hostname: hostname.to_string(),
            address,
            category,
            port,
            transport: Transport::Tcp,
        });

        self.apply_descriptors(descriptors, None, timestamp, started)
            .await
    }

    fn classify_entries(&self, entries: &[InventoryEntry]) -> Vec<ServiceDescriptor> {
        entries
            .iter()
            .flat_map(|entry| {
                self.classifier
                    .classify(entry.hostname.as_deref(), entry.address, &entry.attributes)
            })
            .collect()
    }

    /// Render → Validate → Apply → Activate for an already-classified set
    async fn apply_descriptors(
        &self,
        descriptors: Vec<ServiceDescriptor>,
        shutdown: Option<&watch::Receiver<bool>>,
        timestamp: DateTime<Utc>,
        started: Instant,
    ) -> Result<ReconciliationResult> {
        let service_count = descriptors.len();
        let document = self.renderer.render(&descriptors);

        if let Err(e) = self.validator.validate(&document).await {
            warn!("candidate configuration rejected: {}", e);
            self.emit(ReconcilerEvent::ValidationRejected {
                diagnostics: e.to_string(),
            });
            return Ok(ReconciliationResult::finish(
                CycleStatus::ValidationFailed,
                service_count,
                timestamp,
                started,
            ));
        }

        // Last checkpoint: beyond this point the write/activate pair runs
        // to completion or rollback.
        if shutdown_requested(shutdown) {
            return Err(Error::Other("shutdown requested before apply".to_string()));
        }

        let backup = match self.backup_active().await {
            Ok(backup) => backup,
            Err(e) => {
                // Backup is mandatory before any write; abort with no
                // partial state, same as a failed validation.
                warn!("backup failed, aborting before write: {}", e);
                return Ok(ReconciliationResult::finish(
                    CycleStatus::ValidationFailed,
                    service_count,
                    timestamp,
                    started,
                ));
            }
        };

        if let Err(e) = tokio::fs::write(&self.active_path, document.to_config_text()).await {
            warn!("failed to write active configuration: {}", e);
            self.rollback(&backup).await?;
            self.emit(ReconcilerEvent::RolledBack {
                reason: format!("write failed: {}", e),
            });
            return Ok(ReconciliationResult::finish(
                CycleStatus::ActivationFailedRolledBack,
                service_count,
                timestamp,
                started,
            ));
        }

        match self.activate().await {
            Ok(()) => {
                info!(
                    services = service_count,
                    config = %self.active_path.display(),
                    "configuration applied and activated"
                );
                self.emit(ReconcilerEvent::Applied { service_count });
                Ok(ReconciliationResult::finish(
                    CycleStatus::Applied,
                    service_count,
                    timestamp,
                    started,
                ))
            }
            Err(e) => {
                error!("activation failed, restoring previous configuration: {}", e);
                self.rollback(&backup).await?;
                self.emit(ReconcilerEvent::RolledBack {
                    reason: e.to_string(),
                });
                Ok(ReconciliationResult::finish(
                    CycleStatus::ActivationFailedRolledBack,
                    service_count,
                    timestamp,
                    started,
                ))
            }
        }
    }

    /// Fetch named addresses with a bounded in-cycle retry
    async fn fetch_entries(&self) -> Result<Vec<InventoryEntry>> {
        let filter = AddressFilter::default();
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.fetch_retries {
            match tokio::time::timeout(
                self.fetch_timeout,
                self.inventory.list_active_addresses(&filter),
            )
            .await
            {
                Ok(Ok(entries)) => return Ok(entries),
                Ok(Err(e)) => {
                    warn!(
                        attempt,
                        store = self.inventory.store_name(),
                        "inventory fetch failed: {}",
                        e
                    );
                    last_error = Some(Error::connectivity(format!(
                        "inventory fetch failed: {}",
                        e
                    )));
                }
                Err(_) => {
                    warn!(
                        attempt,
                        store = self.inventory.store_name(),
                        "inventory fetch timed out after {:?}",
                        self.fetch_timeout
                    );
                    last_error = Some(Error::connectivity(format!(
                        "inventory fetch timed out after {:?}",
                        self.fetch_timeout
                    )));
                }
            }

            if attempt < self.fetch_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| Error::connectivity("inventory fetch failed")))
    }

    /// Back up the active configuration before a write
    ///
    /// Returns `Ok(None)` when no active configuration exists yet (first
    /// run). Any error here aborts the cycle before the write.
    async fn backup_active(&self) -> Result<Option<PathBuf>> {
        if !tokio::fs::try_exists(&self.active_path).await? {
            debug!("no active configuration to back up");
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.backup_dir).await?;

        let active_name = self
            .active_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("config");
        let backup_path = self
            .backup_dir
            .join(backup_file_name(active_name, Utc::now()));

        tokio::fs::copy(&self.active_path, &backup_path).await?;
        info!(backup = %backup_path.display(), "backed up active configuration");

        self.prune_backups(active_name).await;

        Ok(Some(backup_path))
    }

    /// Evict the oldest backups beyond the retention cap
    ///
    /// Filename timestamps order chronologically, so a lexicographic sort is
    /// the eviction order. Pruning is best effort; failures are logged.
    async fn prune_backups(&self, active_name: &str) {
        let prefix = format!("{}.backup.", active_name);

        let mut names: Vec<String> = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.backup_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!("failed to read backup directory: {}", e);
                return;
            }
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(&prefix) {
                    names.push(name.to_string());
                }
            }
        }

        if names.len() <= self.backup_keep {
            return;
        }

        names.sort();
        let excess = names.len() - self.backup_keep;
        for name in names.into_iter().take(excess) {
            let path = self.backup_dir.join(&name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(backup = %path.display(), "evicted old backup"),
                Err(e) => warn!(backup = %path.display(), "failed to evict backup: {}", e),
            }
        }
    }

    /// Signal the proxy to reload the active configuration
    async fn activate(&self) -> Result<()> {
        let output = tokio::time::timeout(self.reload_timeout, self.runtime.reload(&self.active_path))
            .await
            .map_err(|_| {
                Error::activation(format!("reload timed out after {:?}", self.reload_timeout))
            })?
            .map_err(|e| Error::activation(format!("reload failed to run: {}", e)))?;

        if output.success {
            Ok(())
        } else {
            Err(Error::activation(output.diagnostics))
        }
    }

    /// Restore the backup over the active path
    ///
    /// One retry of the copy-back; an unreadable backup is fatal because the
    /// active configuration can no longer be guaranteed.
    async fn rollback(&self, backup: &Option<PathBuf>) -> Result<()> {
        match backup {
            Some(path) => {
                if let Err(first) = tokio::fs::copy(path, &self.active_path).await {
                    warn!("rollback copy failed, retrying once: {}", first);
                    if let Err(second) = tokio::fs::copy(path, &self.active_path).await {
                        return Err(Error::fatal_state(format!(
                            "backup {} unreadable during rollback: {} (first attempt: {})",
                            path.display(),
                            second,
                            first
                        )));
                    }
                }
                info!("restored previous configuration from backup");
                Ok(())
            }
            None => {
                // No prior configuration existed; remove the unactivatable
                // candidate so the proxy is not left pointing at it.
                if let Err(e) = tokio::fs::remove_file(&self.active_path).await {
                    warn!("failed to remove candidate after activation failure: {}", e);
                }
                Ok(())
            }
        }
    }

    fn emit(&self, event: ReconcilerEvent) {
        // Nobody draining the receiver must not block or grow memory.
        if self.event_tx.try_send(event).is_err() {
            warn!("event channel full, dropping reconciler event");
        }
    }
}

fn shutdown_requested(shutdown: Option<&watch::Receiver<bool>>) -> bool {
    shutdown.map(|rx| *rx.borrow()).unwrap_or(false)
}

/// Backup filename for a given active file name and moment
///
/// The millisecond timestamp keys chronological order to lexicographic
/// filename order, which both eviction and rollback selection rely on.
fn backup_file_name(active_name: &str, at: DateTime<Utc>) -> String {
    format!("{}.backup.{}", active_name, at.format("%Y%m%d-%H%M%S%3f"))
}
