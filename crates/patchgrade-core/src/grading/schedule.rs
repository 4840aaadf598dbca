//! Which entrants meet in which comparison.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::SubmitterId;

/// How comparisons are scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// Every pair meets once per round; sides swap on alternate rounds.
    RoundRobin { rounds: u32 },
    /// Each entrant meets about `opponents` others, chosen by a seeded order.
    Sampled { opponents: u32, seed: u64 },
    /// Random groups of `size` ranked together, re-drawn each round.
    Groups { size: usize, rounds: u32, seed: u64 },
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig::RoundRobin { rounds: 1 }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            ScheduleConfig::RoundRobin { rounds: 0 } => Err("round_robin.rounds must be positive".into()),
            ScheduleConfig::Sampled { opponents: 0, .. } => {
                Err("sampled.opponents must be positive".into())
            }
            ScheduleConfig::Groups { size, .. } if size < 2 => Err("groups.size must be at least 2".into()),
            ScheduleConfig::Groups { rounds: 0, .. } => Err("groups.rounds must be positive".into()),
            _ => Ok(()),
        }
    }
}

/// A comparison: entrant indices, in the order the judge sees them.
pub(crate) type Match = Vec<usize>;

/// Comparisons whose verdicts can be fetched together.
pub(crate) type Round = Vec<Match>;

pub(crate) fn build(config: &ScheduleConfig, entrants: &[SubmitterId]) -> Vec<Round> {
    let n = entrants.len();
    if n < 2 {
        return Vec::new();
    }
    match *config {
        ScheduleConfig::RoundRobin { rounds } => {
            let circle = circle_rounds(n);
            (0..rounds as usize)
                .flat_map(|rep| {
                    circle.iter().map(move |round| {
                        round
                            .iter()
                            .map(|&(a, b)| if rep % 2 == 0 { vec![a, b] } else { vec![b, a] })
                            .collect::<Round>()
                    })
                })
                .collect()
        }
        ScheduleConfig::Sampled { opponents, seed } => {
            let order = seeded_order(entrants, seed, 0);
            let circle = circle_rounds(n);
            // With an odd count someone sits out every round; two rounds
            // make sure nobody sits out every time.
            let min_rounds = if n % 2 == 1 { 2 } else { 1 };
            let take = (opponents as usize).max(min_rounds).min(circle.len());
            circle
                .into_iter()
                .take(take)
                .map(|round| {
                    round
                        .into_iter()
                        .map(|(a, b)| vec![order[a], order[b]])
                        .collect::<Round>()
                })
                .collect()
        }
        ScheduleConfig::Groups { size, rounds, seed } => (0..rounds)
            .map(|round| {
                let order = seeded_order(entrants, seed, round);
                let mut groups: Vec<Match> = order.chunks(size.max(2)).map(|c| c.to_vec()).collect();
                // A lone leftover joins the previous group.
                if groups.len() > 1 && groups.last().is_some_and(|g| g.len() == 1) {
                    if let Some(last) = groups.pop() {
                        if let Some(prev) = groups.last_mut() {
                            prev.extend(last);
                        }
                    }
                }
                groups
            })
            .collect(),
    }
}

/// Circle-method rounds over `n` entrants: every pair exactly once.
fn circle_rounds(n: usize) -> Vec<Vec<(usize, usize)>> {
    let slots = n + n % 2;
    let bye = n;
    (0..slots - 1)
        .map(|r| {
            let seat = |k: usize| if k == 0 { 0 } else { 1 + (k - 1 + r) % (slots - 1) };
            (0..slots / 2)
                .map(|k| (seat(k), seat(slots - 1 - k)))
                .filter(|&(a, b)| a != bye && b != bye)
                .collect()
        })
        .collect()
}

/// Entrant indices ordered by a hash of seed, round and submitter id, so
/// the order does not depend on input order.
fn seeded_order(entrants: &[SubmitterId], seed: u64, round: u32) -> Vec<usize> {
    let mut keyed: Vec<(Vec<u8>, usize)> = entrants
        .iter()
        .enumerate()
        .map(|(idx, id)| {
            let mut hasher = Sha256::new();
            hasher.update(seed.to_le_bytes());
            hasher.update(round.to_le_bytes());
            hasher.update(id.as_str().as_bytes());
            (hasher.finalize().to_vec(), idx)
        })
        .collect();
    keyed.sort();
    keyed.into_iter().map(|(_, idx)| idx).collect()
}
