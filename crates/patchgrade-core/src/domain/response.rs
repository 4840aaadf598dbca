//! A submitter's candidate patch.

use patchgrade_state::ResponseId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque identity of the party that submitted a response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmitterId(pub String);

impl SubmitterId {
    pub fn new(id: impl Into<String>) -> Self {
        SubmitterId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubmitterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 of a patch's text. Equal digests mean byte-identical patches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchDigest(String);

impl PatchDigest {
    pub fn of(patch: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(patch.as_bytes());
        PatchDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

/// One candidate submitted for a challenge.
///
/// `normalized_patch` is filled in place by the orchestrator before
/// verification; callers construct responses with it unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub response_id: ResponseId,
    pub submitter: SubmitterId,
    pub raw_patch: String,
    #[serde(default)]
    pub normalized_patch: Option<String>,
}

impl Response {
    pub fn new(
        response_id: impl Into<String>,
        submitter: impl Into<String>,
        raw_patch: impl Into<String>,
    ) -> Self {
        Self {
            response_id: ResponseId::new(response_id),
            submitter: SubmitterId::new(submitter),
            raw_patch: raw_patch.into(),
            normalized_patch: None,
        }
    }

    /// The patch that downstream stages should use.
    pub fn patch(&self) -> &str {
        self.normalized_patch.as_deref().unwrap_or(&self.raw_patch)
    }

    pub fn digest(&self) -> PatchDigest {
        PatchDigest::of(self.patch())
    }
}
