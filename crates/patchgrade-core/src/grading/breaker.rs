//! Stops calling a comparison backend that keeps failing.
//!
//! The grader consults the breaker between rounds only, feeding it each
//! round's outcomes in schedule order, so whether it opens never depends on
//! which comparison happened to finish first.

use super::judge::JudgeError;

/// Opens after `threshold` judge failures in a row and stays open until a
/// judge call succeeds. A threshold of 0 never opens.
#[derive(Debug)]
pub(crate) struct JudgeBreaker {
    streak: u32,
    threshold: u32,
}

impl JudgeBreaker {
    pub fn new(threshold: u32) -> Self {
        Self { streak: 0, threshold }
    }

    pub fn is_open(&self) -> bool {
        self.threshold > 0 && self.streak >= self.threshold
    }

    /// `Err` while open, without consulting the backend.
    pub fn admit(&self) -> Result<(), JudgeError> {
        if self.is_open() {
            return Err(JudgeError::Unavailable(format!(
                "judge skipped after {} consecutive failures",
                self.streak
            )));
        }
        Ok(())
    }

    /// Feed the outcome of one judge call.
    pub fn observe(&mut self, succeeded: bool) {
        if succeeded {
            self.streak = 0;
        } else {
            self.streak += 1;
        }
    }
}
