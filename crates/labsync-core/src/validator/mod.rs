//! Config validator
//!
//! Pass/fail gate between rendering and application. The candidate document
//! is written to a scoped temporary file and handed to the proxy runtime's
//! syntax checker; the active configuration is never touched here.
//!
//! The temporary file is owned by a [`tempfile::NamedTempFile`] guard and is
//! removed on every exit path, success or failure. The checker invocation is
//! bounded by a timeout so validation can never stall a reconciliation cycle
//! indefinitely; a timeout counts as a validation failure, not a crash.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::renderer::ConfigDocument;
use crate::traits::ProxyRuntime;

/// Suffix for candidate files, so checker logs stay readable
const CANDIDATE_SUFFIX: &str = ".caddyfile";

/// Timeout-bound validator delegating to an external checker
pub struct ConfigValidator {
    runtime: Arc<dyn ProxyRuntime>,
    timeout: Duration,
}

impl ConfigValidator {
    pub fn new(runtime: Arc<dyn ProxyRuntime>, timeout: Duration) -> Self {
        Self { runtime, timeout }
    }

    /// Validate a candidate document
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the checker accepted the candidate
    /// - `Err(Error::Validation)`: rejected, timed out, or the checker
    ///   could not be run
    pub async fn validate(&self, document: &ConfigDocument) -> Result<()> {
        let mut candidate = tempfile::Builder::new()
            .prefix("labsync-candidate-")
            .suffix(CANDIDATE_SUFFIX)
            .tempfile()
            .map_err(|e| Error::validation(format!("failed to create candidate file: {}", e)))?;

        candidate
            .write_all(document.to_config_text().as_bytes())
            .and_then(|_| candidate.flush())
            .map_err(|e| Error::validation(format!("failed to write candidate file: {}", e)))?;

        debug!(
            path = %candidate.path().display(),
            blocks = document.block_count(),
            "checking candidate configuration"
        );

        let output = tokio::time::timeout(self.timeout, self.runtime.check_config(candidate.path()))
            .await
            .map_err(|_| {
                Error::validation(format!(
                    "configuration check timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| Error::validation(format!("configuration check failed to run: {}", e)))?;

        if output.success {
            Ok(())
        } else {
            Err(Error::validation(output.diagnostics))
        }
        // candidate dropped here; the temp file is removed on every path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ServiceCategory, ServiceDescriptor};
    use crate::renderer::ConfigRenderer;
    use crate::traits::{CheckOutput, Transport};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct RecordingRuntime {
        accept: bool,
        seen_path: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl ProxyRuntime for RecordingRuntime {
        async fn check_config(&self, path: &Path) -> Result<CheckOutput> {
            *self.seen_path.lock().unwrap() = Some(path.to_path_buf());
            if self.accept {
                Ok(CheckOutput::ok())
            } else {
                Ok(CheckOutput::failed("unexpected token"))
            }
        }

        async fn reload(&self, _path: &Path) -> Result<CheckOutput> {
            Ok(CheckOutput::ok())
        }

        fn runtime_name(&self) -> &'static str {
            "recording"
        }
    }

    fn sample_document() -> ConfigDocument {
        let renderer = ConfigRenderer::new("lab.example");
        renderer.render(&[ServiceDescriptor {
            hostname: "grafana".to_string(),
            address: "10.203.1.20".parse().unwrap(),
            category: ServiceCategory::Monitoring,
            port: 3000,
            transport: Transport::Tcp,
        }])
    }

    #[tokio::test]
    async fn accepted_candidate_passes_and_temp_file_is_removed() {
        let runtime = Arc::new(RecordingRuntime {
            accept: true,
            seen_path: Mutex::new(None),
        });
        let validator = ConfigValidator::new(runtime.clone(), Duration::from_secs(5));

        validator.validate(&sample_document()).await.unwrap();

        let seen = runtime.seen_path.lock().unwrap().clone().unwrap();
        assert!(seen.to_string_lossy().ends_with(".caddyfile"));
        assert!(!seen.exists(), "candidate file must be removed after validation");
    }

    #[tokio::test]
    async fn rejected_candidate_yields_validation_error() {
        let runtime = Arc::new(RecordingRuntime {
            accept: false,
            seen_path: Mutex::new(None),
        });
        let validator = ConfigValidator::new(runtime.clone(), Duration::from_secs(5));

        let err = validator.validate(&sample_document()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let seen = runtime.seen_path.lock().unwrap().clone().unwrap();
        assert!(!seen.exists(), "candidate file must be removed on failure too");
    }

    #[tokio::test]
    async fn slow_checker_counts_as_validation_failure() {
        struct SlowRuntime;

        #[async_trait]
        impl ProxyRuntime for SlowRuntime {
            async fn check_config(&self, _path: &Path) -> Result<CheckOutput> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(CheckOutput::ok())
            }

            async fn reload(&self, _path: &Path) -> Result<CheckOutput> {
                Ok(CheckOutput::ok())
            }

            fn runtime_name(&self) -> &'static str {
                "slow"
            }
        }

        tokio::time::pause();
        let validator = ConfigValidator::new(Arc::new(SlowRuntime), Duration::from_millis(50));
        let doc = sample_document();
        let fut = validator.validate(&doc);
        tokio::pin!(fut);
        tokio::time::advance(Duration::from_secs(1)).await;
        let err = fut.await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
