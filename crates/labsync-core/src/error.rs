//! Error types for the labsync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for labsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the labsync system
#[derive(Error, Debug)]
pub enum Error {
    /// A collaborator was unreachable or timed out.
    ///
    /// Retryable by the next scheduled cycle; the fetch stage additionally
    /// retries a small bounded number of times within the cycle.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// A candidate configuration document was rejected by the checker.
    ///
    /// The cycle aborts with no change to the active configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// The proxy reload failed after a validated write.
    ///
    /// Triggers rollback to the pre-cycle backup.
    #[error("activation error: {0}")]
    Activation(String),

    /// The backup was unreadable during rollback.
    ///
    /// The active configuration can no longer be guaranteed; this is the
    /// only error that halts the scheduler loop.
    #[error("fatal state error: {0}")]
    FatalState(String),

    /// Inventory store errors
    #[error("inventory error: {0}")]
    Inventory(String),

    /// Name service errors
    #[error("name service error: {0}")]
    NameService(String),

    /// Network prober errors
    #[error("prober error: {0}")]
    Prober(String),

    /// Proxy runtime errors (checker or reload subprocess plumbing)
    #[error("proxy runtime error: {0}")]
    Proxy(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an activation error
    pub fn activation(msg: impl Into<String>) -> Self {
        Self::Activation(msg.into())
    }

    /// Create a fatal state error
    pub fn fatal_state(msg: impl Into<String>) -> Self {
        Self::FatalState(msg.into())
    }

    /// Create an inventory error
    pub fn inventory(msg: impl Into<String>) -> Self {
        Self::Inventory(msg.into())
    }

    /// Create a name service error
    pub fn name_service(msg: impl Into<String>) -> Self {
        Self::NameService(msg.into())
    }

    /// Create a prober error
    pub fn prober(msg: impl Into<String>) -> Self {
        Self::Prober(msg.into())
    }

    /// Create a proxy runtime error
    pub fn proxy(msg: impl Into<String>) -> Self {
        Self::Proxy(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error must halt the scheduler loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalState(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
