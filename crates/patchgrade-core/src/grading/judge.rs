//! Comparison backend capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Challenge, PatchDigest, Response, SubmitterId};

/// One submitter's patch as the grader sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrant {
    pub submitter: SubmitterId,
    /// Normalized patch text.
    pub patch: String,
    pub digest: PatchDigest,
}

impl Entrant {
    pub fn new(submitter: SubmitterId, patch: impl Into<String>) -> Self {
        let patch = patch.into();
        let digest = PatchDigest::of(&patch);
        Self {
            submitter,
            patch,
            digest,
        }
    }

    pub fn from_response(response: &Response) -> Self {
        Self::new(response.submitter.clone(), response.patch())
    }
}

/// Outcome of a two-way comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairVerdict {
    FirstWins,
    SecondWins,
    Tie,
}

/// Ranking of the entrants of one comparison, in entrant order.
///
/// Rank 0 is best; equal ranks are ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub ranks: Vec<u32>,
}

impl Verdict {
    pub fn from_ranks(ranks: Vec<u32>) -> Self {
        Self { ranks }
    }

    /// Everyone ties.
    pub fn tie(n: usize) -> Self {
        Self { ranks: vec![0; n] }
    }

    pub fn pair(verdict: PairVerdict) -> Self {
        let ranks = match verdict {
            PairVerdict::FirstWins => vec![0, 1],
            PairVerdict::SecondWins => vec![1, 0],
            PairVerdict::Tie => vec![0, 0],
        };
        Self { ranks }
    }

    /// The two-way reading of this verdict, if it has two entrants.
    pub fn as_pair(&self) -> Option<PairVerdict> {
        match self.ranks.as_slice() {
            [a, b] if a < b => Some(PairVerdict::FirstWins),
            [a, b] if a > b => Some(PairVerdict::SecondWins),
            [_, _] => Some(PairVerdict::Tie),
            _ => None,
        }
    }

    pub(crate) fn check_len(&self, entrants: usize) -> Result<(), JudgeError> {
        if self.ranks.len() != entrants {
            return Err(JudgeError::InvalidVerdict(format!(
                "expected {entrants} ranks, got {}",
                self.ranks.len()
            )));
        }
        Ok(())
    }
}

/// Errors from a comparison backend. Each one costs a single comparison.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge backend error: {0}")]
    Backend(String),

    #[error("judge request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid verdict: {0}")]
    InvalidVerdict(String),

    #[error("judge unavailable: {0}")]
    Unavailable(String),
}

/// Supplies a preference between two or more patches for the same challenge.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Rank `entrants` (at least two). `Verdict::ranks` follows entrant order.
    async fn compare(&self, challenge: &Challenge, entrants: &[Entrant]) -> Result<Verdict, JudgeError>;

    fn name(&self) -> &str {
        "judge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_verdicts_round_trip_through_ranks() {
        for v in [PairVerdict::FirstWins, PairVerdict::SecondWins, PairVerdict::Tie] {
            assert_eq!(Verdict::pair(v).as_pair(), Some(v));
        }
        assert_eq!(Verdict::tie(3).as_pair(), None);
    }

    #[test]
    fn check_len_rejects_wrong_arity() {
        assert!(Verdict::tie(2).check_len(2).is_ok());
        let err = Verdict::tie(2).check_len(3).unwrap_err();
        assert!(matches!(err, JudgeError::InvalidVerdict(_)));
    }

    #[test]
    fn entrant_digest_tracks_patch_text() {
        let a = Entrant::new(SubmitterId::new("a"), "+x = 1");
        let b = Entrant::new(SubmitterId::new("b"), "+x = 1");
        let c = Entrant::new(SubmitterId::new("c"), "+x = 2");
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
    }
}
