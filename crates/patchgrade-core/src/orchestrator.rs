//! Per-challenge evaluation: normalize, verify, grade, assemble.
//!
//! The orchestrator is the only component with side effects on shared
//! state, and its only one is the failure channel: every response that does
//! not survive verification is reported exactly once, before grading starts.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use patchgrade_state::{FailureRecorder, ResponseId};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};

use crate::config::EvalConfig;
use crate::domain::{Challenge, EvalError, Response, Result, SandboxOutcome, SubmitterId, ValidationResult};
use crate::grading::{EloGrader, Entrant, Judge};
use crate::metrics::METRICS;
use crate::normalize::normalize_with;
use crate::obs;
use crate::sandbox::{PreparedChallenge, SandboxExecutor, Verifier};

/// What verification made of one response.
#[derive(Debug, Clone, PartialEq)]
enum Screening {
    Passed,
    /// The patch's fault.
    Rejected(String),
    /// Ours: the verification could not run.
    Broken(String),
}

/// Runs the evaluation pipeline for one challenge at a time.
pub struct Evaluator {
    config: EvalConfig,
    verifier: Arc<dyn Verifier>,
    grader: EloGrader,
    failures: Arc<dyn FailureRecorder>,
}

impl Evaluator {
    pub fn new(
        config: EvalConfig,
        verifier: Arc<dyn Verifier>,
        judge: Arc<dyn Judge>,
        failures: Arc<dyn FailureRecorder>,
    ) -> Result<Self> {
        config.validate()?;
        let grader = EloGrader::new(judge, config.grading.clone());
        Ok(Self {
            config,
            verifier,
            grader,
            failures,
        })
    }

    /// An evaluator verifying in local git sandboxes.
    pub fn with_sandbox(
        config: EvalConfig,
        judge: Arc<dyn Judge>,
        failures: Arc<dyn FailureRecorder>,
    ) -> Result<Self> {
        let verifier = Arc::new(SandboxExecutor::new(config.sandbox.clone()));
        Self::new(config, verifier, judge, failures)
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluate `responses` against `challenge`.
    ///
    /// Fills in each response's `normalized_patch`. Returns one result per
    /// response that survived verification, in input order. Responses that
    /// did not survive are absent and were reported to the failure channel.
    /// In bypass mode every response gets the fixed bypass score and nothing
    /// else happens.
    pub async fn evaluate(
        &self,
        challenge: &Challenge,
        responses: &mut [Response],
    ) -> Result<Vec<ValidationResult>> {
        let span = obs::evaluation_span(&challenge.challenge_id, responses.len());
        self.run(challenge, responses).instrument(span).await
    }

    async fn run(&self, challenge: &Challenge, responses: &mut [Response]) -> Result<Vec<ValidationResult>> {
        let start = Instant::now();
        METRICS.inc_evaluations();

        if self.config.bypass {
            obs::emit_evaluation_bypassed(
                &challenge.challenge_id,
                responses.len(),
                self.config.bypass_score,
            );
            return Ok(responses
                .iter()
                .map(|r| ValidationResult {
                    response_id: r.response_id.clone(),
                    submitter: r.submitter.clone(),
                    score: self.config.bypass_score,
                    error: None,
                })
                .collect());
        }

        challenge.validate()?;
        obs::emit_evaluation_started(&challenge.challenge_id, responses.len());
        if responses.is_empty() {
            obs::emit_evaluation_finished(&challenge.challenge_id, 0, 0, 0);
            return Ok(Vec::new());
        }

        let prepared = self
            .verifier
            .prepare(challenge)
            .await
            .map_err(|e| EvalError::ReferenceUnavailable(e.to_string()))?;
        let prepared = Arc::new(prepared);
        self.normalize_all(&prepared, responses).await;
        let screenings = self.screen(prepared, responses).await;

        let mut survivors = Vec::new();
        let mut failed = Vec::new();
        for (response, screening) in responses.iter().zip(screenings) {
            match screening {
                Screening::Passed => {
                    METRICS.inc_verifications_passed();
                    survivors.push(response);
                }
                Screening::Rejected(reason) => {
                    METRICS.inc_sandbox_rejections();
                    obs::emit_response_rejected(
                        response.response_id.as_str(),
                        response.submitter.as_str(),
                        &reason,
                    );
                    failed.push(&response.response_id);
                }
                Screening::Broken(error) => {
                    METRICS.inc_infrastructure_errors();
                    obs::emit_infrastructure_error(
                        response.response_id.as_str(),
                        response.submitter.as_str(),
                        &error,
                    );
                    failed.push(&response.response_id);
                }
            }
        }

        self.record_failures(&failed).await;

        let results = self.grade(challenge, &survivors).await?;
        obs::emit_evaluation_finished(
            &challenge.challenge_id,
            start.elapsed().as_millis() as u64,
            survivors.len(),
            failed.len(),
        );
        Ok(results)
    }

    /// Fill in every `normalized_patch`, off the async workers. Base files
    /// come from the prepared reference checkout. Oversized patches, and any
    /// whose normalization fails, keep their raw text.
    async fn normalize_all(&self, prepared: &Arc<PreparedChallenge>, responses: &mut [Response]) {
        let limit = self.config.max_normalize_bytes;
        let mut join_set = JoinSet::new();
        for (idx, response) in responses.iter().enumerate() {
            let raw = response.raw_patch.clone();
            if raw.len() > limit {
                warn!(
                    response_id = %response.response_id,
                    bytes = raw.len(),
                    limit,
                    "patch too large to normalize"
                );
                continue;
            }
            let prepared = Arc::clone(prepared);
            join_set.spawn_blocking(move || {
                let base = |path: &str| prepared.reference_file(path);
                (idx, normalize_with(&raw, &base))
            });
        }
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, normalized)) => responses[idx].normalized_patch = Some(normalized),
                Err(e) => warn!(error = %e, "normalization task failed"),
            }
        }
        for response in responses.iter_mut().filter(|r| r.normalized_patch.is_none()) {
            response.normalized_patch = Some(response.raw_patch.clone());
        }
    }

    /// Verify every response, a bounded number at a time. Results come back
    /// in input order; a verification that panics counts as broken.
    async fn screen(&self, prepared: Arc<PreparedChallenge>, responses: &[Response]) -> Vec<Screening> {
        let sem = Arc::new(Semaphore::new(self.config.max_concurrent_verifications));
        let limit = self.config.verification_timeout();
        let mut join_set = JoinSet::new();

        for (idx, response) in responses.iter().enumerate() {
            let verifier = Arc::clone(&self.verifier);
            let prepared = Arc::clone(&prepared);
            let sem = Arc::clone(&sem);
            let patch = response.patch().to_string();
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                (idx, verify_one(verifier.as_ref(), &prepared, &patch, limit).await)
            });
        }

        let mut ordered: Vec<Option<Screening>> = vec![None; responses.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, screening)) => ordered[idx] = Some(screening),
                Err(e) => warn!(error = %e, "verification task ended without a result"),
            }
        }
        ordered
            .into_iter()
            .map(|s| s.unwrap_or_else(|| Screening::Broken("verification result missing".into())))
            .collect()
    }

    /// Report each failed response once. Channel errors are logged only.
    async fn record_failures(&self, failed: &[&ResponseId]) {
        let unique: BTreeSet<&ResponseId> = failed.iter().copied().collect();
        for response_id in unique {
            if let Err(e) = self.failures.mark_failed(response_id).await {
                obs::emit_failure_record_error(response_id.as_str(), &e);
            }
        }
    }

    /// Grade the first surviving response of each submitter; later ones
    /// from the same submitter share that score.
    async fn grade(&self, challenge: &Challenge, survivors: &[&Response]) -> Result<Vec<ValidationResult>> {
        let mut seen: BTreeSet<&SubmitterId> = BTreeSet::new();
        let mut entrants = Vec::new();
        for &response in survivors {
            if seen.insert(&response.submitter) {
                entrants.push(Entrant::from_response(response));
            }
        }
        if entrants.len() < survivors.len() {
            debug!(
                survivors = survivors.len(),
                entrants = entrants.len(),
                "submitters with several surviving responses graded once"
            );
        }

        let scores = if entrants.is_empty() {
            Default::default()
        } else {
            self.grader.grade(challenge, &entrants).await?
        };

        Ok(survivors
            .iter()
            .map(|r| ValidationResult {
                response_id: r.response_id.clone(),
                submitter: r.submitter.clone(),
                score: scores.get(&r.submitter).copied().unwrap_or(0.0),
                error: None,
            })
            .collect())
    }
}

async fn verify_one(verifier: &dyn Verifier, prepared: &PreparedChallenge, patch: &str, limit: Duration) -> Screening {
    let guarded = AssertUnwindSafe(verifier.verify(prepared, patch)).catch_unwind();
    match tokio::time::timeout(limit, guarded).await {
        Ok(Ok(Ok(SandboxOutcome::Pass))) => Screening::Passed,
        Ok(Ok(Ok(SandboxOutcome::Fail { reason }))) => Screening::Rejected(reason),
        Ok(Ok(Err(e))) => Screening::Broken(e.to_string()),
        Ok(Err(panic)) => Screening::Broken(format!("verifier panicked: {}", panic_message(panic.as_ref()))),
        Err(_) => Screening::Broken(format!("verification timed out after {}s", limit.as_secs())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
