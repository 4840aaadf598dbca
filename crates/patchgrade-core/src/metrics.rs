//! Global atomic counters for evaluation observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of an evaluation).
//!
//! Sandbox rejections (the patch's fault) and infrastructure errors (ours)
//! are kept apart so a broken runner never reads as bad submissions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters; bumping one never allocates or locks.
pub struct Metrics {
    evaluations: AtomicU64,
    verifications_passed: AtomicU64,
    sandbox_rejections: AtomicU64,
    infrastructure_errors: AtomicU64,
    comparisons_judged: AtomicU64,
    comparisons_skipped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            verifications_passed: AtomicU64::new(0),
            sandbox_rejections: AtomicU64::new(0),
            infrastructure_errors: AtomicU64::new(0),
            comparisons_judged: AtomicU64::new(0),
            comparisons_skipped: AtomicU64::new(0),
        }
    }

    pub fn inc_evaluations(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations", "counter incremented");
    }

    pub fn inc_verifications_passed(&self) {
        self.verifications_passed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "verifications_passed", "counter incremented");
    }

    /// A patch failed to apply, failed its tests or regressed lint.
    pub fn inc_sandbox_rejections(&self) {
        self.sandbox_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sandbox_rejections", "counter incremented");
    }

    /// Verification could not run: workspace, clone, spawn or timeout trouble.
    pub fn inc_infrastructure_errors(&self) {
        self.infrastructure_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "infrastructure_errors", "counter incremented");
    }

    pub fn inc_comparisons_judged(&self) {
        self.comparisons_judged.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "comparisons_judged", "counter incremented");
    }

    pub fn inc_comparisons_skipped(&self) {
        self.comparisons_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "comparisons_skipped", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations = self.evaluations(),
            verifications_passed = self.verifications_passed(),
            sandbox_rejections = self.sandbox_rejections(),
            infrastructure_errors = self.infrastructure_errors(),
            comparisons_judged = self.comparisons_judged(),
            comparisons_skipped = self.comparisons_skipped(),
        );
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn verifications_passed(&self) -> u64 {
        self.verifications_passed.load(Ordering::Relaxed)
    }

    pub fn sandbox_rejections(&self) -> u64 {
        self.sandbox_rejections.load(Ordering::Relaxed)
    }

    pub fn infrastructure_errors(&self) -> u64 {
        self.infrastructure_errors.load(Ordering::Relaxed)
    }

    pub fn comparisons_judged(&self) -> u64 {
        self.comparisons_judged.load(Ordering::Relaxed)
    }

    pub fn comparisons_skipped(&self) -> u64 {
        self.comparisons_skipped.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.evaluations.store(0, Ordering::Relaxed);
        self.verifications_passed.store(0, Ordering::Relaxed);
        self.sandbox_rejections.store(0, Ordering::Relaxed);
        self.infrastructure_errors.store(0, Ordering::Relaxed);
        self.comparisons_judged.store(0, Ordering::Relaxed);
        self.comparisons_skipped.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_and_infrastructure_errors_are_separate() {
        let m = Metrics::new();
        m.inc_sandbox_rejections();
        m.inc_sandbox_rejections();
        m.inc_infrastructure_errors();
        assert_eq!(m.sandbox_rejections(), 2);
        assert_eq!(m.infrastructure_errors(), 1);
        assert_eq!(m.verifications_passed(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_evaluations();
        m.inc_verifications_passed();
        m.inc_comparisons_judged();
        m.inc_comparisons_skipped();
        m.reset();
        assert_eq!(m.evaluations(), 0);
        assert_eq!(m.verifications_passed(), 0);
        assert_eq!(m.comparisons_judged(), 0);
        assert_eq!(m.comparisons_skipped(), 0);
    }
}
