//! Error types for the failure channel

use thiserror::Error;

/// Errors raised by [`crate::FailureRecorder`] backends.
#[derive(Error, Debug)]
pub enum StateError {
    /// Response id rejected before it reached the backend
    #[error("invalid response id: {0:?}")]
    InvalidResponseId(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
