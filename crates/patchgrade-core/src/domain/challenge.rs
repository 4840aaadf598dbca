//! Challenge definition: the read-only problem every response is judged against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::EvalError;

/// Where the reference repository comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySource {
    /// Local path or URL accepted by `git clone`.
    pub source: String,

    /// Commit, tag or branch to check out after cloning. `None` keeps the
    /// clone's default HEAD.
    #[serde(default)]
    pub base_ref: Option<String>,
}

/// An external command run inside a sandbox workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for this command only.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
        }
    }

    /// Convenience for `sh -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.into()],
            env: BTreeMap::new(),
        }
    }

    /// Human-readable rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Immutable problem definition owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,

    pub repository: RepositorySource,

    /// Free-form task description handed to comparison judges.
    #[serde(default)]
    pub problem_statement: String,

    /// Verification suite; a non-zero exit is a failing patch.
    pub test_command: CommandSpec,

    /// Static analysis run before and after patching. Findings are parsed
    /// from `path:line[:col]: CODE: message` lines.
    #[serde(default)]
    pub lint_command: Option<CommandSpec>,
}

impl Challenge {
    /// Reject challenges no verification could run against.
    pub fn validate(&self) -> super::Result<()> {
        if self.challenge_id.trim().is_empty() {
            return Err(EvalError::InvalidChallenge("challenge_id is empty".into()));
        }
        if self.repository.source.trim().is_empty() {
            return Err(EvalError::InvalidChallenge("repository source is empty".into()));
        }
        if self.test_command.program.trim().is_empty() {
            return Err(EvalError::InvalidChallenge("test command has no program".into()));
        }
        if self
            .lint_command
            .as_ref()
            .is_some_and(|lint| lint.program.trim().is_empty())
        {
            return Err(EvalError::InvalidChallenge("lint command has no program".into()));
        }
        Ok(())
    }
}
