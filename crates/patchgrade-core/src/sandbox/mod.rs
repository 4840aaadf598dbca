//! Sandboxed patch verification.
//!
//! Every verification gets its own clone of the challenge repository in a
//! temporary directory. The clone keeps no remote pointing back at the
//! reference, and challenge commands run confined (see [`Isolation`]), so
//! concurrent verifications never see each other's changes and the
//! reference is never written to.
//!
//! ```text
//! clone + checkout -> git apply --check -> git apply -> tests -> lint diff
//! ```

mod command;
mod confine;
mod config;
mod error;
mod executor;
mod lint;
mod workspace;

pub use command::CommandOutput;
pub use config::SandboxConfig;
pub use confine::{namespaces_available, Isolation};
pub use error::{SandboxError, SandboxResult};
pub use executor::{PreparedChallenge, SandboxExecutor, Verifier};
pub use lint::{parse_findings, LintBaseline, LintFinding};
