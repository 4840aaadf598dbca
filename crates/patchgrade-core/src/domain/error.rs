//! Batch-level error taxonomy.
//!
//! Per-response problems never surface here: a bad patch becomes a
//! `SandboxOutcome::Fail`, an infrastructure hiccup during one verification
//! is logged and the response is dropped. Only problems with shared
//! infrastructure abort the whole evaluation.

/// Errors that abort an evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("reference repository unavailable: {0}")]
    ReferenceUnavailable(String),

    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("grading failed: {0}")]
    Grading(#[from] crate::grading::GradingError),
}

/// Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, EvalError>;
