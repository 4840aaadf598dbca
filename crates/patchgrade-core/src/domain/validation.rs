//! Verification outcomes and the externally visible result type.

use patchgrade_state::ResponseId;
use serde::{Deserialize, Serialize};

use super::response::SubmitterId;

/// Verdict of the sandbox for one patch.
///
/// A failing patch is a value, not an error: infrastructure trouble is
/// reported separately as [`crate::sandbox::SandboxError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SandboxOutcome {
    Pass,
    Fail { reason: String },
}

impl SandboxOutcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        SandboxOutcome::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, SandboxOutcome::Pass)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SandboxOutcome::Pass => None,
            SandboxOutcome::Fail { reason } => Some(reason),
        }
    }
}

/// Score for one considered response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub response_id: ResponseId,
    pub submitter: SubmitterId,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(SandboxOutcome::fail("patch does not apply")).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["reason"], "patch does not apply");
        assert_eq!(
            serde_json::to_value(SandboxOutcome::Pass).unwrap()["status"],
            "pass"
        );
    }

    #[test]
    fn reason_only_on_failure() {
        assert!(SandboxOutcome::Pass.reason().is_none());
        assert_eq!(SandboxOutcome::fail("x").reason(), Some("x"));
        assert!(!SandboxOutcome::fail("x").is_pass());
    }
}
