//! Error types for the sandbox module.
//!
//! Everything here is an infrastructure problem. A patch that does not
//! apply, fails its tests or regresses lint is a
//! [`SandboxOutcome::Fail`](crate::domain::SandboxOutcome), not an error.

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("git {action} failed: {detail}")]
    Git { action: String, detail: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} timed out after {secs}s")]
    Timeout { step: String, secs: u64 },

    #[error("cannot confine challenge commands: {0}")]
    Isolation(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
