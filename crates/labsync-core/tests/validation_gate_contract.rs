//! Contract: a rejected candidate never touches the active configuration
//!
//! When the proxy runtime rejects the rendered candidate, the cycle must
//! finish with `ValidationFailed`, the active configuration file must remain
//! byte-identical, no backup may be taken, and no reload may be attempted.

mod common;

use common::{MockInventory, ScriptedRuntime, entry, test_config};
use labsync_core::reconciler::{CycleStatus, ProxyReconciler, ReconcilerEvent};
use std::sync::Arc;

#[tokio::test]
async fn rejected_candidate_leaves_active_config_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let previous = "# previous config\nnas.lab.example {\n}\n";
    tokio::fs::write(&config.proxy.active_config_path, previous)
        .await
        .unwrap();

    let inventory = MockInventory::new(vec![entry("192.168.1.10", "grafana")]);
    let runtime = ScriptedRuntime::new();
    runtime.reject_config();

    let (reconciler, mut events) =
        ProxyReconciler::new(Arc::new(inventory), Arc::new(runtime.clone()), &config).unwrap();

    let result = reconciler.run_cycle().await.unwrap();

    assert_eq!(result.status, CycleStatus::ValidationFailed);
    assert_eq!(result.service_count, 1);

    let on_disk = tokio::fs::read_to_string(&config.proxy.active_config_path)
        .await
        .unwrap();
    assert_eq!(on_disk, previous, "active config must be byte-identical");

    // Validation failed before the backup stage
    assert!(!config.proxy.backup_dir.exists());
    assert_eq!(runtime.reload_call_count(), 0);

    assert_eq!(events.recv().await, Some(ReconcilerEvent::CycleStarted));
    assert!(matches!(
        events.recv().await,
        Some(ReconcilerEvent::ValidationRejected { .. })
    ));
}

#[tokio::test]
async fn empty_inventory_skips_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let inventory = MockInventory::empty();
    let runtime = ScriptedRuntime::new();

    let (reconciler, _events) =
        ProxyReconciler::new(Arc::new(inventory), Arc::new(runtime.clone()), &config).unwrap();

    let result = reconciler.run_cycle().await.unwrap();

    assert_eq!(result.status, CycleStatus::NoServices);
    assert_eq!(result.service_count, 0);
    assert_eq!(runtime.check_call_count(), 0);
    assert_eq!(runtime.reload_call_count(), 0);
    assert!(!config.proxy.active_config_path.exists());
}

#[tokio::test]
async fn unreachable_inventory_surfaces_a_connectivity_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let inventory = MockInventory::empty();
    inventory.set_fail_list(true);
    let runtime = ScriptedRuntime::new();

    let (reconciler, _events) =
        ProxyReconciler::new(Arc::new(inventory.clone()), Arc::new(runtime), &config).unwrap();

    let err = reconciler.run_cycle().await.unwrap_err();
    assert!(matches!(err, labsync_core::Error::Connectivity(_)));
    assert!(!err.is_fatal(), "fetch failures are retryable, not fatal");
    // fetch_retries is 0 in the test config, so exactly one attempt
    assert_eq!(inventory.list_call_count(), 1);
}
