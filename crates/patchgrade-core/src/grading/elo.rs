//! Elo ratings for one grading run.

/// Rating every submitter starts from.
pub const DEFAULT_BASELINE: f64 = 1500.0;

/// Maximum rating change per comparison.
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Expected score of a player rated `rating` against `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

/// Ratings indexed by entrant position.
#[derive(Debug, Clone)]
pub struct RatingTable {
    ratings: Vec<f64>,
    comparisons: Vec<u32>,
    k_factor: f64,
}

impl RatingTable {
    pub fn new(entrants: usize, baseline: f64, k_factor: f64) -> Self {
        Self {
            ratings: vec![baseline; entrants],
            comparisons: vec![0; entrants],
            k_factor,
        }
    }

    pub fn rating(&self, idx: usize) -> f64 {
        self.ratings[idx]
    }

    /// Comparisons applied so far that included `idx`.
    pub fn comparisons(&self, idx: usize) -> u32 {
        self.comparisons[idx]
    }

    pub fn ratings(&self) -> &[f64] {
        &self.ratings
    }

    /// Apply one comparison among `participants` with their `ranks`
    /// (0 = best, equal = tie).
    ///
    /// Each participant meets every other one. Per pair the observed score is
    /// 1 for the better rank, 0 for the worse, and 1 for both sides of a tie,
    /// where the expected score is fixed at 0.5. The summed surprise is
    /// averaged over the opponents and scaled by K. All deltas come from the
    /// ratings as they were before this comparison.
    pub fn apply(&mut self, participants: &[usize], ranks: &[u32]) {
        let n = participants.len();
        if n < 2 || ranks.len() != n {
            return;
        }
        let before: Vec<f64> = participants.iter().map(|&p| self.ratings[p]).collect();

        let deltas: Vec<f64> = (0..n)
            .map(|a| {
                let surprise: f64 = (0..n)
                    .filter(|&b| b != a)
                    .map(|b| {
                        if ranks[a] == ranks[b] {
                            1.0 - 0.5
                        } else {
                            let observed = if ranks[a] < ranks[b] { 1.0 } else { 0.0 };
                            observed - expected_score(before[a], before[b])
                        }
                    })
                    .sum();
                self.k_factor * surprise / (n - 1) as f64
            })
            .collect();

        for (slot, &p) in participants.iter().enumerate() {
            self.ratings[p] += deltas[slot];
            self.comparisons[p] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn equal_ratings_expect_half() {
        assert!(close(expected_score(1500.0, 1500.0), 0.5));
        assert!(expected_score(1600.0, 1500.0) > 0.5);
        assert!(close(
            expected_score(1600.0, 1500.0) + expected_score(1500.0, 1600.0),
            1.0
        ));
    }

    #[test]
    fn win_between_equals_moves_half_k() {
        let mut table = RatingTable::new(2, DEFAULT_BASELINE, DEFAULT_K_FACTOR);
        table.apply(&[0, 1], &[0, 1]);
        assert!(close(table.rating(0), 1516.0));
        assert!(close(table.rating(1), 1484.0));
        assert_eq!(table.comparisons(0), 1);
    }

    #[test]
    fn tie_lifts_both_above_baseline_equally() {
        let mut table = RatingTable::new(2, DEFAULT_BASELINE, DEFAULT_K_FACTOR);
        table.apply(&[0, 1], &[0, 0]);
        assert!(table.rating(0) > DEFAULT_BASELINE);
        assert!(close(table.rating(0), table.rating(1)));
    }

    #[test]
    fn group_update_uses_pre_comparison_ratings() {
        let mut table = RatingTable::new(3, DEFAULT_BASELINE, DEFAULT_K_FACTOR);
        table.apply(&[0, 1, 2], &[0, 1, 2]);
        // Best beats both: (0.5 + 0.5) / 2 * 32.
        assert!(close(table.rating(0), 1516.0));
        assert!(close(table.rating(1), 1500.0));
        assert!(close(table.rating(2), 1484.0));
    }

    #[test]
    fn malformed_comparisons_are_ignored() {
        let mut table = RatingTable::new(2, DEFAULT_BASELINE, DEFAULT_K_FACTOR);
        table.apply(&[0], &[0]);
        table.apply(&[0, 1], &[0]);
        assert_eq!(table.ratings(), &[DEFAULT_BASELINE, DEFAULT_BASELINE]);
        assert_eq!(table.comparisons(0), 0);
    }
}
