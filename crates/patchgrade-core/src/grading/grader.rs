//! Batch Elo grading over a comparison schedule.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::breaker::JudgeBreaker;
use super::elo::{RatingTable, DEFAULT_BASELINE, DEFAULT_K_FACTOR};
use super::judge::{Entrant, Judge, JudgeError, Verdict};
use super::schedule::{self, Match, ScheduleConfig};
use super::GradingError;
use crate::config::ConfigError;
use crate::domain::{Challenge, SubmitterId};
use crate::metrics::METRICS;
use crate::obs;

/// Rating parameters and comparison schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub baseline: f64,
    pub k_factor: f64,
    pub schedule: ScheduleConfig,
    /// Comparisons of one round in flight at once.
    pub max_concurrent_comparisons: usize,
    /// Consecutive judge failures after which the remaining comparisons
    /// are skipped without asking. 0 disables the breaker.
    pub judge_failure_threshold: u32,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            baseline: DEFAULT_BASELINE,
            k_factor: DEFAULT_K_FACTOR,
            schedule: ScheduleConfig::default(),
            max_concurrent_comparisons: 8,
            judge_failure_threshold: 16,
        }
    }
}

impl GradingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.baseline.is_finite() {
            return Err(ConfigError::Invalid("grading.baseline must be finite".into()));
        }
        if !(self.k_factor.is_finite() && self.k_factor > 0.0) {
            return Err(ConfigError::Invalid("grading.k_factor must be positive".into()));
        }
        if self.max_concurrent_comparisons == 0 {
            return Err(ConfigError::Invalid(
                "grading.max_concurrent_comparisons must be positive".into(),
            ));
        }
        self.schedule
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("grading.schedule: {e}")))
    }
}

/// How a scheduled comparison was settled.
enum Settled {
    Judged(Verdict),
    /// Every patch was byte-identical; no backend call needed.
    Identical(usize),
    /// The judge was asked and failed.
    Failed(JudgeError),
    /// Not sent: the breaker was open when the round began.
    Held,
}

/// Scores entrants by running comparisons through a [`Judge`] and folding
/// the verdicts into Elo ratings.
pub struct EloGrader {
    judge: Arc<dyn Judge>,
    config: GradingConfig,
}

impl EloGrader {
    pub fn new(judge: Arc<dyn Judge>, config: GradingConfig) -> Self {
        Self { judge, config }
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    /// Final rating per submitter.
    ///
    /// A failed comparison is skipped; it never fails the batch. Entrants
    /// who end up in no successful comparison keep the baseline, and a
    /// lone entrant gets the baseline without any comparison.
    #[instrument(skip_all, fields(challenge = %challenge.challenge_id, entrants = entrants.len(), judge = self.judge.name()))]
    pub async fn grade(
        &self,
        challenge: &Challenge,
        entrants: &[Entrant],
    ) -> Result<BTreeMap<SubmitterId, f64>, GradingError> {
        self.config
            .validate()
            .map_err(|e| GradingError::InvalidConfig(e.to_string()))?;

        let mut seen = BTreeSet::new();
        for entrant in entrants {
            if !seen.insert(&entrant.submitter) {
                return Err(GradingError::DuplicateEntrant(entrant.submitter.to_string()));
            }
        }

        let mut table = RatingTable::new(entrants.len(), self.config.baseline, self.config.k_factor);
        let mut breaker = JudgeBreaker::new(self.config.judge_failure_threshold);
        let ids: Vec<SubmitterId> = entrants.iter().map(|e| e.submitter.clone()).collect();

        for round in schedule::build(&self.config.schedule, &ids) {
            self.run_round(challenge, entrants, &round, &mut table, &mut breaker)
                .await;
        }

        // Anyone every scheduled comparison missed gets paired directly.
        for idx in 0..entrants.len() {
            if entrants.len() < 2 || table.comparisons(idx) > 0 {
                continue;
            }
            for other in (0..entrants.len()).filter(|&o| o != idx) {
                if breaker.is_open() {
                    break;
                }
                debug!(submitter = %entrants[idx].submitter, opponent = %entrants[other].submitter, "repairing coverage");
                let applied = self
                    .run_round(challenge, entrants, &[vec![idx, other]], &mut table, &mut breaker)
                    .await;
                if applied > 0 {
                    break;
                }
            }
        }

        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(idx, id)| (id, table.rating(idx)))
            .collect())
    }

    /// Settle a round's comparisons concurrently and apply them in schedule
    /// order. Returns how many were applied.
    ///
    /// The breaker is asked once, before the round starts, and learns the
    /// round's judge outcomes afterwards in schedule order.
    async fn run_round(
        &self,
        challenge: &Challenge,
        entrants: &[Entrant],
        round: &[Match],
        table: &mut RatingTable,
        breaker: &mut JudgeBreaker,
    ) -> usize {
        let gate = breaker.admit();
        let open = gate.is_err();
        let settled: Vec<Settled> = stream::iter(round)
            .map(|participants| self.settle(challenge, entrants, participants, open))
            .buffered(self.config.max_concurrent_comparisons.max(1))
            .collect()
            .await;

        let mut applied = 0;
        for (participants, outcome) in round.iter().zip(settled) {
            match outcome {
                Settled::Judged(verdict) => {
                    breaker.observe(true);
                    table.apply(participants, &verdict.ranks);
                    METRICS.inc_comparisons_judged();
                    applied += 1;
                }
                Settled::Identical(n) => {
                    table.apply(participants, &Verdict::tie(n).ranks);
                    applied += 1;
                }
                Settled::Failed(err) => {
                    breaker.observe(false);
                    skipped(entrants, participants, &err);
                }
                Settled::Held => {
                    if let Err(err) = &gate {
                        skipped(entrants, participants, err);
                    }
                }
            }
        }
        applied
    }

    async fn settle(
        &self,
        challenge: &Challenge,
        entrants: &[Entrant],
        participants: &Match,
        breaker_open: bool,
    ) -> Settled {
        let group: Vec<Entrant> = participants.iter().map(|&p| entrants[p].clone()).collect();
        if group.windows(2).all(|w| w[0].digest == w[1].digest) {
            return Settled::Identical(group.len());
        }
        if breaker_open {
            return Settled::Held;
        }

        let verdict = self
            .judge
            .compare(challenge, &group)
            .await
            .and_then(|v| v.check_len(group.len()).map(|_| v));
        match verdict {
            Ok(v) => Settled::Judged(v),
            Err(e) => Settled::Failed(e),
        }
    }
}

fn skipped(entrants: &[Entrant], participants: &Match, err: &JudgeError) {
    let names: Vec<&str> = participants
        .iter()
        .map(|&p| entrants[p].submitter.as_str())
        .collect();
    obs::emit_comparison_skipped(&names, err);
    METRICS.inc_comparisons_skipped();
}
