// # labsync-core
//
// Core library for the labsync homelab convergence system.
//
// ## Architecture Overview
//
// The system observes the network's actual state and converges two external
// declarative stores toward it: an inventory/IPAM system and a reverse-proxy
// configuration. Two sibling control loops share the same shape
// (gather → transform → validate-or-skip → apply-with-rollback → report):
//
// - **ProxyReconciler**: inventory entries → classified services → rendered
//   configuration → validated → atomically swapped in with backup/rollback
// - **DiscoveryReconciler**: network scan → host facts → idempotent
//   inventory upserts → hostname propagation to DNS
//
// All external systems (inventory store, name service, network prober,
// proxy runtime) live behind narrow async traits; the core never performs
// collaborator I/O directly.
//
// ## Design Principles
//
// 1. **Separation of Concerns**: orchestration is separate from collaborators
// 2. **Rollback Safety**: the proxy is never left broken or half-applied
// 3. **Partial Tolerance**: one bad host never aborts a discovery batch
// 4. **Explicit Configuration**: one immutable config struct, no globals

pub mod classifier;
pub mod config;
pub mod discovery;
pub mod error;
pub mod proxy;
pub mod reconciler;
pub mod renderer;
pub mod scheduler;
pub mod traits;
pub mod validator;

// Re-export core types for convenience
pub use classifier::{ClassificationRule, ServiceCategory, ServiceClassifier, ServiceDescriptor};
pub use config::{DiscoveryConfig, EngineConfig, ProxyConfig, SyncConfig};
pub use discovery::{DiscoveryReconciler, DiscoveryReport};
pub use error::{Error, Result};
pub use proxy::CommandProxy;
pub use reconciler::{CycleStatus, ProxyReconciler, ReconcilerEvent, ReconciliationResult};
pub use renderer::{ConfigDocument, ConfigRenderer};
pub use scheduler::RecurringTask;
pub use validator::ConfigValidator;
