//! Failure channel trait definitions
//!
//! `mark_failed` is fire-and-forget from the caller's point of view: the
//! orchestrator logs a backend error and moves on. Backends must tolerate
//! concurrent calls and must treat repeated ids as a no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Result type for failure channel operations
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Identifier of one submitted response, distinct from the submitter identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub String);

impl ResponseId {
    pub fn new(id: impl Into<String>) -> Self {
        ResponseId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResponseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResponseId {
    fn from(s: &str) -> Self {
        ResponseId(s.to_string())
    }
}

/// One entry written by a durable backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub response_id: ResponseId,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn now(response_id: ResponseId) -> Self {
        Self {
            response_id,
            recorded_at: Utc::now(),
        }
    }
}

/// Write-only sink for responses that failed verification.
///
/// Guarantees:
/// - `mark_failed(id)` is idempotent: a second call for the same id records nothing new.
/// - Concurrent calls never interleave or corrupt entries.
#[async_trait]
pub trait FailureRecorder: Send + Sync {
    /// Record that `response_id` failed and must not be scored.
    async fn mark_failed(&self, response_id: &ResponseId) -> StateResult<()>;
}

pub(crate) fn check_response_id(response_id: &ResponseId) -> StateResult<()> {
    if response_id.0.trim().is_empty() {
        return Err(StateError::InvalidResponseId(response_id.0.clone()));
    }
    Ok(())
}
