//! patchgrade core library
//!
//! Comparative evaluation of untrusted code patches: normalize each patch,
//! verify it in an isolated clone of the challenge repository, then rank
//! the survivors with Elo ratings from pairwise or group comparisons.

pub mod config;
pub mod domain;
pub mod grading;
pub mod metrics;
pub mod normalize;
pub mod obs;
pub mod orchestrator;
pub mod sandbox;
pub mod telemetry;

pub use config::{ConfigError, EvalConfig, DEFAULT_BYPASS_SCORE};

pub use domain::{
    Challenge, CommandSpec, EvalError, PatchDigest, RepositorySource, Response, Result,
    SandboxOutcome, SubmitterId, ValidationResult,
};

pub use grading::{
    EloGrader, Entrant, GradingConfig, GradingError, HeuristicJudge, HttpJudge, Judge, JudgeError,
    ScheduleConfig, Verdict,
};

pub use normalize::{normalize, normalize_with, try_normalize, try_normalize_with, NormalizeError};

pub use orchestrator::Evaluator;

pub use sandbox::{SandboxConfig, SandboxError, SandboxExecutor, Verifier};

pub use telemetry::init_tracing;

/// Crate version, reported by the CLI and sent to remote judges.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
