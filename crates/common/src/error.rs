//! Error types for steptrace

use thiserror::Error;

/// Result type alias using the steptrace Error
pub type Result<T> = std::result::Result<T, Error>;

/// steptrace error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A step ended that was never started and was not skipped.
    #[error("Mismatched step event: step `{step_id}` ended in test `{test}` without a matching start")]
    MismatchedStep { step_id: String, test: String },

    /// An event referenced a test path that never emitted `test:start`.
    #[error("Event references unknown test `{path}`")]
    UnknownTest { path: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl Error {
    /// Whether this error signals broken upstream instrumentation
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::MismatchedStep { .. } | Error::UnknownTest { .. })
    }
}
