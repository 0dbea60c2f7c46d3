/*!
Error types for the Baton core engine.
*/

use thiserror::Error;

/// Result type used throughout the Baton core.
pub type Result<T> = std::result::Result<T, BatonError>;

/// Errors that can occur while setting up or running a relay.
#[derive(Error, Debug)]
pub enum BatonError {
    /// The running program could not be re-invoked as a subordinate process
    #[error("Restart capability unavailable: expected probe answer {expected:?}, got {actual:?}")]
    RestartCapabilityUnavailable { expected: String, actual: String },

    /// The checkpoint file or its containing directory is not writable
    #[error("Storage is not writable, can't save data: {0}")]
    StorageUnwritable(String),

    /// The host session context could not be started
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// The host's execution-time ceiling could not be retrieved
    #[error("Budget configuration unavailable: {0}")]
    BudgetConfigUnavailable(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Integrity check failures
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Invalid checkpoint format
    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// The restart could not be triggered
    #[error("Restart error: {0}")]
    Restart(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// This process was started as a capability probe and has answered it.
    /// It must stop without doing any further work.
    #[error("Invocation was a capability probe and has been answered")]
    ProbeAnswered,
}

impl BatonError {
    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new session error
    pub fn session<S: Into<String>>(msg: S) -> Self {
        Self::SessionUnavailable(msg.into())
    }

    /// Create a new restart error
    pub fn restart<S: Into<String>>(msg: S) -> Self {
        Self::Restart(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Whether this error is one of the fatal initialization failures
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::RestartCapabilityUnavailable { .. }
                | Self::StorageUnwritable(_)
                | Self::SessionUnavailable(_)
                | Self::BudgetConfigUnavailable(_)
        )
    }
}
