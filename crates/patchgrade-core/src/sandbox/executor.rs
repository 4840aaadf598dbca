//! Patch verification: apply, test, lint-regression check.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::config::SandboxConfig;
use super::error::{SandboxError, SandboxResult};
use super::lint::{parse_findings, LintBaseline, LintFinding};
use super::workspace::Workspace;
use super::CommandOutput;
use crate::domain::{Challenge, SandboxOutcome};

/// How many failing tests or new findings a rejection reason lists.
const REASON_ITEMS: usize = 5;
/// Output lines quoted when no failing test can be identified.
const REASON_TAIL_LINES: usize = 15;
/// Larger reference files are not offered to the normalizer.
const REFERENCE_FILE_MAX_BYTES: u64 = 4 * 1024 * 1024;

/// A challenge plus whatever was learned from the unpatched reference.
#[derive(Debug, Clone)]
pub struct PreparedChallenge {
    pub challenge: Challenge,
    /// `None` when the challenge has no lint command.
    pub lint_baseline: Option<LintBaseline>,
    /// Checkout of the unpatched reference, kept for the whole batch.
    reference: Option<Arc<Workspace>>,
}

impl PreparedChallenge {
    /// A challenge with no baseline information.
    pub fn new(challenge: Challenge) -> Self {
        Self {
            challenge,
            lint_baseline: None,
            reference: None,
        }
    }

    /// A file of the unpatched reference, by repository-relative path.
    ///
    /// Blocking. `None` when there is no reference checkout or the path does
    /// not name a regular file inside it.
    pub fn reference_file(&self, path: &str) -> Option<String> {
        self.reference
            .as_ref()?
            .read_file(path, REFERENCE_FILE_MAX_BYTES)
    }
}

/// Capability to decide whether a patch is acceptable.
///
/// `Ok(Fail)` is a verdict on the patch; `Err` means verification itself
/// broke and says nothing about the patch.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Per-batch setup against the unpatched reference.
    async fn prepare(&self, challenge: &Challenge) -> SandboxResult<PreparedChallenge> {
        Ok(PreparedChallenge::new(challenge.clone()))
    }

    async fn verify(&self, prepared: &PreparedChallenge, patch: &str) -> SandboxResult<SandboxOutcome>;
}

/// Verifies patches in throwaway clones of the challenge repository.
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Prepare and verify in one go, for a single patch.
    pub async fn verify_against(&self, challenge: &Challenge, patch: &str) -> SandboxResult<SandboxOutcome> {
        let prepared = self.prepare(challenge).await?;
        self.verify(&prepared, patch).await
    }

    async fn lint(&self, ws: &Workspace, challenge: &Challenge) -> SandboxResult<Option<Vec<LintFinding>>> {
        let Some(lint) = &challenge.lint_command else {
            return Ok(None);
        };
        let out = ws
            .run(lint, self.config.lint_timeout())
            .await?
            .ok_or_else(|| SandboxError::Timeout {
                step: "lint".into(),
                secs: self.config.lint_timeout_secs,
            })?;
        // Linters exit non-zero whenever they report anything.
        Ok(Some(parse_findings(&out.combined())))
    }
}

#[async_trait]
impl Verifier for SandboxExecutor {
    /// Clones the reference once: proves it is reachable, records its lint
    /// findings and keeps the checkout for reading base files.
    #[instrument(skip_all, fields(challenge = %challenge.challenge_id))]
    async fn prepare(&self, challenge: &Challenge) -> SandboxResult<PreparedChallenge> {
        let ws = Workspace::checkout(&challenge.repository, &self.config).await?;
        let lint_baseline = self
            .lint(&ws, challenge)
            .await?
            .map(|findings| LintBaseline::from_findings(&findings));
        if let Some(baseline) = &lint_baseline {
            debug!(findings = baseline.len(), "lint baseline recorded");
        }
        Ok(PreparedChallenge {
            challenge: challenge.clone(),
            lint_baseline,
            reference: Some(Arc::new(ws)),
        })
    }

    #[instrument(skip_all, fields(challenge = %prepared.challenge.challenge_id))]
    async fn verify(&self, prepared: &PreparedChallenge, patch: &str) -> SandboxResult<SandboxOutcome> {
        let challenge = &prepared.challenge;
        if patch.trim().is_empty() {
            return Ok(SandboxOutcome::fail("patch does not apply: empty patch"));
        }

        let ws = Workspace::checkout(&challenge.repository, &self.config).await?;

        if let Err(why) = ws.apply(patch).await? {
            return Ok(SandboxOutcome::fail(format!("patch does not apply: {why}")));
        }

        match ws.run(&challenge.test_command, self.config.test_timeout()).await? {
            None => {
                return Ok(SandboxOutcome::fail(format!(
                    "tests timed out after {}s",
                    self.config.test_timeout_secs
                )))
            }
            Some(out) if !out.passed() => {
                return Ok(SandboxOutcome::fail(format!(
                    "tests failed (exit code {}): {}",
                    out.exit_code,
                    summarize_test_failure(&out)
                )))
            }
            Some(_) => {}
        }

        let baseline = prepared.lint_baseline.clone().unwrap_or_default();
        if let Some(findings) = self.lint(&ws, challenge).await? {
            let new = baseline.regressions(&findings);
            if !new.is_empty() {
                return Ok(SandboxOutcome::fail(format!(
                    "new lint findings: {}",
                    list_with_more(new.iter().map(LintFinding::describe).collect())
                )));
            }
        }

        Ok(SandboxOutcome::Pass)
    }
}

/// Failing test ids from pytest-style summaries, else the tail of the output.
fn summarize_test_failure(out: &CommandOutput) -> String {
    let combined = out.combined();
    let failing: Vec<String> = combined
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("FAILED ") || l.starts_with("ERROR "))
        .map(str::to_string)
        .collect();
    if !failing.is_empty() {
        return list_with_more(failing);
    }

    let lines: Vec<&str> = combined.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = &lines[lines.len().saturating_sub(REASON_TAIL_LINES)..];
    if tail.is_empty() {
        "no output".to_string()
    } else {
        tail.join("\n")
    }
}

fn list_with_more(items: Vec<String>) -> String {
    let extra = items.len().saturating_sub(REASON_ITEMS);
    let mut text = items.into_iter().take(REASON_ITEMS).collect::<Vec<_>>().join("; ");
    if extra > 0 {
        text.push_str(&format!(" (+{extra} more)"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 1,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 1,
        }
    }

    #[test]
    fn summary_lists_pytest_failures() {
        let out = output(
            "..F.\n\
             FAILED tests/test_calc.py::test_add - assert 0 == 3\n\
             ERROR tests/test_io.py::test_read\n\
             1 failed, 2 passed\n",
        );
        assert_eq!(
            summarize_test_failure(&out),
            "FAILED tests/test_calc.py::test_add - assert 0 == 3; ERROR tests/test_io.py::test_read"
        );
    }

    #[test]
    fn summary_falls_back_to_output_tail() {
        let out = output("boom\n\nTraceback: x\n");
        assert_eq!(summarize_test_failure(&out), "boom\nTraceback: x");
        assert_eq!(summarize_test_failure(&output("")), "no output");
    }

    #[test]
    fn long_lists_are_truncated() {
        let items: Vec<String> = (0..8).map(|i| format!("f{i}")).collect();
        assert_eq!(list_with_more(items), "f0; f1; f2; f3; f4 (+3 more)");
    }
}
