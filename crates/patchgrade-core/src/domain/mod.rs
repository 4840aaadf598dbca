//! Domain types shared by every evaluation stage.

pub mod challenge;
pub mod error;
pub mod response;
pub mod validation;

pub use challenge::{Challenge, CommandSpec, RepositorySource};
pub use error::{EvalError, Result};
pub use response::{PatchDigest, Response, SubmitterId};
pub use validation::{SandboxOutcome, ValidationResult};
