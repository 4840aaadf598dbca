//! Structured observability hooks for the evaluation lifecycle.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Events are emitted at `info!` level, problems at `warn!`; the filter
//! comes from `RUST_LOG` (see [`crate::telemetry`]).

use tracing::{info, warn};

/// Span covering one challenge's evaluation.
///
/// Attach it with `tracing::Instrument::instrument` so it stays correct
/// across `.await` points.
pub fn evaluation_span(challenge_id: &str, responses: usize) -> tracing::Span {
    tracing::info_span!("patchgrade.evaluation", challenge_id = %challenge_id, responses = responses)
}

pub fn emit_evaluation_started(challenge_id: &str, responses: usize) {
    info!(event = "evaluation.started", challenge_id = %challenge_id, responses = responses);
}

/// Emit event: bypass mode answered without running the pipeline.
pub fn emit_evaluation_bypassed(challenge_id: &str, responses: usize, score: f64) {
    info!(
        event = "evaluation.bypassed",
        challenge_id = %challenge_id,
        responses = responses,
        score = score,
    );
}

/// Emit event: the sandbox rejected a patch.
pub fn emit_response_rejected(response_id: &str, submitter: &str, reason: &str) {
    info!(
        event = "response.rejected",
        response_id = %response_id,
        submitter = %submitter,
        reason = %reason,
    );
}

/// Emit event: a response could not be verified for reasons unrelated to
/// the patch (warning level).
pub fn emit_infrastructure_error(response_id: &str, submitter: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "response.infrastructure_error",
        response_id = %response_id,
        submitter = %submitter,
        error = %error,
    );
}

/// Emit event: a comparison was dropped (warning level).
pub fn emit_comparison_skipped(participants: &[&str], error: &dyn std::fmt::Display) {
    warn!(
        event = "grading.comparison_skipped",
        participants = %participants.join(","),
        error = %error,
    );
}

pub fn emit_evaluation_finished(challenge_id: &str, duration_ms: u64, survivors: usize, failed: usize) {
    info!(
        event = "evaluation.finished",
        challenge_id = %challenge_id,
        duration_ms = duration_ms,
        survivors = survivors,
        failed = failed,
    );
}

/// Emit event: the failure channel refused a notification (warning level).
pub fn emit_failure_record_error(response_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "response.failure_record_error", response_id = %response_id, error = %error);
}
