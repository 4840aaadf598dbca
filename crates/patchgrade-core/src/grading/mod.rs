//! Comparative grading.
//!
//! Surviving patches are compared through a [`Judge`] on a
//! [`ScheduleConfig`] and every verdict moves Elo ratings. Final ratings
//! are the scores. Ratings live for one grading run only.

mod breaker;
mod elo;
mod grader;
mod heuristic;
mod judge;
mod remote;
mod schedule;

pub use elo::{expected_score, RatingTable, DEFAULT_BASELINE, DEFAULT_K_FACTOR};
pub use grader::{EloGrader, GradingConfig};
pub use heuristic::HeuristicJudge;
pub use judge::{Entrant, Judge, JudgeError, PairVerdict, Verdict};
pub use remote::HttpJudge;
pub use schedule::ScheduleConfig;

/// Errors that abort a grading run. Judge failures are not among them.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("submitter {0} entered twice")]
    DuplicateEntrant(String),

    #[error("invalid grading configuration: {0}")]
    InvalidConfig(String),
}
