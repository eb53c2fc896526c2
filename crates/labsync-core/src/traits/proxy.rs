// # Proxy Runtime Trait
//
// Defines the interface to the reverse-proxy collaborator: syntax checking
// of candidate documents and reloading the active configuration.
//
// ## Implementations
//
// - Subprocess (`caddy validate` / `caddy reload`): [`crate::proxy::CommandProxy`]
//
// Implementations run exactly one checker or reload invocation per call and
// never touch the active configuration file themselves; file ownership
// belongs to the proxy reconciler.

use async_trait::async_trait;
use std::path::Path;

/// Outcome of a checker or reload invocation
#[derive(Debug, Clone)]
pub struct CheckOutput {
    /// Whether the process reported success (zero exit)
    pub success: bool,
    /// Captured diagnostics (stderr, or stdout if stderr was empty)
    pub diagnostics: String,
}

impl CheckOutput {
    /// A successful invocation with no diagnostics
    pub fn ok() -> Self {
        Self {
            success: true,
            diagnostics: String::new(),
        }
    }

    /// A failed invocation carrying diagnostics
    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Trait for proxy runtime implementations
#[async_trait]
pub trait ProxyRuntime: Send + Sync {
    /// Check the syntax/semantics of a configuration file
    ///
    /// Operates on the given path only; must not read or mutate the active
    /// configuration.
    async fn check_config(&self, path: &Path) -> Result<CheckOutput, crate::Error>;

    /// Signal the proxy process to reload the given configuration
    async fn reload(&self, path: &Path) -> Result<CheckOutput, crate::Error>;

    /// Get the runtime name (for logging/debugging)
    fn runtime_name(&self) -> &'static str;
}
