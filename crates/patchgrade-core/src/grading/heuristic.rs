//! Offline judge that needs no backend.

use async_trait::async_trait;

use super::judge::{Entrant, Judge, JudgeError, Verdict};
use crate::domain::Challenge;

/// Prefers the smaller change: fewer added plus removed lines wins, equal
/// sizes tie. Deterministic, so it suits tests and dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicJudge;

impl HeuristicJudge {
    /// Added plus removed lines, file headers excluded.
    pub fn change_size(patch: &str) -> usize {
        patch
            .lines()
            .filter(|l| {
                (l.starts_with('+') && !l.starts_with("+++"))
                    || (l.starts_with('-') && !l.starts_with("---"))
            })
            .count()
    }
}

#[async_trait]
impl Judge for HeuristicJudge {
    async fn compare(&self, _challenge: &Challenge, entrants: &[Entrant]) -> Result<Verdict, JudgeError> {
        let sizes: Vec<usize> = entrants.iter().map(|e| Self::change_size(&e.patch)).collect();
        let mut distinct = sizes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        let ranks = sizes
            .iter()
            .map(|s| distinct.iter().position(|d| d == s).unwrap_or(0) as u32)
            .collect();
        Ok(Verdict::from_ranks(ranks))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandSpec, RepositorySource, SubmitterId};
    use crate::grading::PairVerdict;

    fn challenge() -> Challenge {
        Challenge {
            challenge_id: "c".into(),
            repository: RepositorySource {
                source: "/repo".into(),
                base_ref: None,
            },
            problem_statement: String::new(),
            test_command: CommandSpec::new("true", &[]),
            lint_command: None,
        }
    }

    const SMALL: &str = "--- a/x.py\n+++ b/x.py\n@@ -1 +1 @@\n-a = 0\n+a = 1\n";
    const LARGE: &str = "--- a/x.py\n+++ b/x.py\n@@ -1 +1,2 @@\n-a = 0\n+a = 1\n+b = 2\n";

    #[test]
    fn change_size_ignores_file_headers() {
        assert_eq!(HeuristicJudge::change_size(SMALL), 2);
        assert_eq!(HeuristicJudge::change_size(LARGE), 3);
    }

    #[tokio::test]
    async fn smaller_change_wins() {
        let entrants = [
            Entrant::new(SubmitterId::new("big"), LARGE),
            Entrant::new(SubmitterId::new("small"), SMALL),
        ];
        let verdict = HeuristicJudge.compare(&challenge(), &entrants).await.unwrap();
        assert_eq!(verdict.as_pair(), Some(PairVerdict::SecondWins));
    }

    #[tokio::test]
    async fn group_ranks_are_dense() {
        let entrants = [
            Entrant::new(SubmitterId::new("a"), LARGE),
            Entrant::new(SubmitterId::new("b"), SMALL),
            Entrant::new(SubmitterId::new("c"), SMALL),
        ];
        let verdict = HeuristicJudge.compare(&challenge(), &entrants).await.unwrap();
        assert_eq!(verdict.ranks, vec![1, 0, 0]);
    }
}
