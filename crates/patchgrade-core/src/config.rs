//! Evaluation configuration, loaded from TOML.
//!
//! ```toml
//! bypass = false
//! max_concurrent_verifications = 4
//! verification_timeout_secs = 900
//! max_normalize_bytes = 1048576
//!
//! [sandbox]
//! test_timeout_secs = 600
//! pass_env = ["PATH", "LANG"]
//!
//! [grading]
//! k_factor = 32.0
//! schedule = { kind = "sampled", opponents = 3, seed = 7 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::grading::{GradingConfig, ScheduleConfig};
pub use crate::sandbox::SandboxConfig;

/// Score every response gets in bypass mode.
pub const DEFAULT_BYPASS_SCORE: f64 = 5.0;
/// Patches above this size are verified and graded as submitted.
pub const DEFAULT_MAX_NORMALIZE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Top-level evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Skip the pipeline and return `bypass_score` for every response.
    pub bypass: bool,
    pub bypass_score: f64,
    /// Sandboxes running at once.
    pub max_concurrent_verifications: usize,
    /// Hard limit for one response's whole verification. Hitting it is an
    /// infrastructure error, not a verdict on the patch.
    pub verification_timeout_secs: u64,
    /// Larger raw patches skip normalization.
    pub max_normalize_bytes: usize,
    pub sandbox: SandboxConfig,
    pub grading: GradingConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            bypass: false,
            bypass_score: DEFAULT_BYPASS_SCORE,
            max_concurrent_verifications: 4,
            verification_timeout_secs: 900,
            max_normalize_bytes: DEFAULT_MAX_NORMALIZE_BYTES,
            sandbox: SandboxConfig::default(),
            grading: GradingConfig::default(),
        }
    }
}

impl EvalConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EvalConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bypass_score.is_finite() {
            return Err(ConfigError::Invalid("bypass_score must be finite".into()));
        }
        if self.max_concurrent_verifications == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_verifications must be positive".into(),
            ));
        }
        if self.verification_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "verification_timeout_secs must be positive".into(),
            ));
        }
        if self.max_normalize_bytes == 0 {
            return Err(ConfigError::Invalid("max_normalize_bytes must be positive".into()));
        }
        self.sandbox.validate()?;
        self.grading.validate()
    }
}
