//! Sandbox execution limits and child-process environment.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::confine::Isolation;
use crate::config::ConfigError;

/// Configuration for sandboxed verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Git executable used to clone and apply.
    pub git_program: String,
    /// Limit for cloning and checking out the reference (seconds).
    pub clone_timeout_secs: u64,
    /// Limit for `git apply` (seconds).
    pub apply_timeout_secs: u64,
    /// Limit for the test suite (seconds). Exceeding it fails the patch.
    pub test_timeout_secs: u64,
    /// Limit for the lint run (seconds). Exceeding it is an infrastructure error.
    pub lint_timeout_secs: u64,
    /// Variables copied from the evaluator's own environment. `HOME` is
    /// always replaced with a directory inside the workspace.
    pub pass_env: Vec<String>,
    /// Fixed variables set for every child process.
    pub env: BTreeMap<String, String>,
    /// Namespace confinement for test and lint commands.
    pub isolation: Isolation,
    /// Give confined commands an empty network namespace.
    pub isolate_network: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            git_program: "git".to_string(),
            clone_timeout_secs: 300,
            apply_timeout_secs: 60,
            test_timeout_secs: 600,
            lint_timeout_secs: 300,
            pass_env: vec!["PATH".to_string()],
            env: BTreeMap::new(),
            isolation: Isolation::BestEffort,
            isolate_network: false,
        }
    }
}

impl SandboxConfig {
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    pub fn lint_timeout(&self) -> Duration {
        Duration::from_secs(self.lint_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.git_program.trim().is_empty() {
            return Err(ConfigError::Invalid("sandbox.git_program is empty".into()));
        }
        let limits = [
            ("sandbox.clone_timeout_secs", self.clone_timeout_secs),
            ("sandbox.apply_timeout_secs", self.apply_timeout_secs),
            ("sandbox.test_timeout_secs", self.test_timeout_secs),
            ("sandbox.lint_timeout_secs", self.lint_timeout_secs),
        ];
        for (name, secs) in limits {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.env.contains_key("HOME") {
            return Err(ConfigError::Invalid(
                "sandbox.env may not set HOME; it points into the workspace".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_default() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.git_program, "git");
        assert_eq!(cfg.test_timeout(), Duration::from_secs(600));
        assert_eq!(cfg.pass_env, vec!["PATH".to_string()]);
        assert_eq!(cfg.isolation, Isolation::BestEffort);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sandbox_config_serde_roundtrip() {
        let mut cfg = SandboxConfig {
            test_timeout_secs: 30,
            ..SandboxConfig::default()
        };
        cfg.env.insert("PYTHONHASHSEED".into(), "0".into());
        let json = serde_json::to_string(&cfg).unwrap();
        let back: SandboxConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_isolation_from_toml() {
        let cfg: SandboxConfig = toml::from_str("isolation = \"required\"\nisolate_network = true").unwrap();
        assert_eq!(cfg.isolation, Isolation::Required);
        assert!(cfg.isolate_network);
        assert_eq!(cfg.test_timeout_secs, 600);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cfg = SandboxConfig {
            lint_timeout_secs: 0,
            ..SandboxConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("lint_timeout_secs"));
    }

    #[test]
    fn test_home_override_rejected() {
        let mut cfg = SandboxConfig::default();
        cfg.env.insert("HOME".into(), "/root".into());
        assert!(cfg.validate().is_err());
    }
}
