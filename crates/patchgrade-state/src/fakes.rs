//! In-memory fakes for the failure channel (testing only)

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::failure_traits::*;

/// In-memory recorder that remembers every id and how often it was reported.
///
/// Idempotence is observable: `recorded()` lists each id once, while
/// `call_count()` still counts every `mark_failed` invocation.
#[derive(Debug, Default)]
pub struct MemoryFailureRecorder {
    calls: Mutex<HashMap<ResponseId, usize>>,
    order: Mutex<Vec<ResponseId>>,
}

impl MemoryFailureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids in first-recorded order, each listed once.
    pub fn recorded(&self) -> Vec<ResponseId> {
        self.order.lock().unwrap().clone()
    }

    /// How many times `mark_failed` was called for `response_id`.
    pub fn call_count(&self, response_id: &ResponseId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(response_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn contains(&self, response_id: &ResponseId) -> bool {
        self.call_count(response_id) > 0
    }
}

#[async_trait]
impl FailureRecorder for MemoryFailureRecorder {
    async fn mark_failed(&self, response_id: &ResponseId) -> StateResult<()> {
        check_response_id(response_id)?;
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(response_id.clone()).or_insert(0);
        if *count == 0 {
            self.order.lock().unwrap().push(response_id.clone());
        }
        *count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_marks_are_recorded_once() {
        let recorder = MemoryFailureRecorder::new();
        let id = ResponseId::new("r-1");
        recorder.mark_failed(&id).await.unwrap();
        recorder.mark_failed(&id).await.unwrap();

        assert_eq!(recorder.recorded(), vec![id.clone()]);
        assert_eq!(recorder.call_count(&id), 2);
    }

    #[tokio::test]
    async fn blank_id_is_an_error() {
        let recorder = MemoryFailureRecorder::new();
        assert!(recorder.mark_failed(&ResponseId::new("")).await.is_err());
        assert!(recorder.recorded().is_empty());
    }
}
