// # Command Proxy Runtime
//
// Subprocess implementation of [`ProxyRuntime`] driving the proxy binary
// directly (`caddy validate --config ...` and `caddy reload --config ...`).
//
// ## Behavior
//
// - One subprocess per invocation, no shell involved
// - Exit status maps to `CheckOutput::success`; stderr (or stdout when
//   stderr is empty) becomes the diagnostics
// - Spawn failures surface as `Error::Proxy`; policy decisions (abort,
//   rollback) are owned by the callers

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::{CheckOutput, ProxyRuntime};

/// Default proxy binary
const DEFAULT_BINARY: &str = "caddy";

/// Proxy runtime shelling out to the proxy binary
#[derive(Debug, Clone)]
pub struct CommandProxy {
    binary: String,
}

impl Default for CommandProxy {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

impl CommandProxy {
    /// Create a runtime using the given binary name or path
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, subcommand: &str, config_path: &Path) -> Result<CheckOutput> {
        debug!(binary = %self.binary, subcommand, config = %config_path.display(), "invoking proxy binary");

        let output = Command::new(&self.binary)
            .arg(subcommand)
            .arg("--config")
            .arg(config_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::proxy(format!(
                    "failed to run '{} {}': {}",
                    self.binary, subcommand, e
                ))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let diagnostics = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };

        Ok(CheckOutput {
            success: output.status.success(),
            diagnostics,
        })
    }
}

#[async_trait]
impl ProxyRuntime for CommandProxy {
    async fn check_config(&self, path: &Path) -> Result<CheckOutput> {
        self.run("validate", path).await
    }

    async fn reload(&self, path: &Path) -> Result<CheckOutput> {
        self.run("reload", path).await
    }

    fn runtime_name(&self) -> &'static str {
        "caddy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_surfaces_proxy_error() {
        let runtime = CommandProxy::new("labsync-test-no-such-binary");
        let err = runtime
            .check_config(Path::new("/tmp/does-not-matter"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Proxy(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_maps_to_failed_output() {
        // `false` exits 1 without reading its arguments
        let runtime = CommandProxy::new("false");
        let out = runtime
            .check_config(Path::new("/tmp/does-not-matter"))
            .await
            .unwrap();
        assert!(!out.success);
    }
}
