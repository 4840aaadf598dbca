//! Judge backed by a remote HTTP service.
//!
//! The service receives
//! `{"challenge_id", "problem_statement", "entrants": [{"patch"}]}`
//! and answers `{"ranks": [..]}` in entrant order (0 = best). Who submitted
//! a patch never leaves the process.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::judge::{Entrant, Judge, JudgeError, Verdict};
use crate::domain::Challenge;

#[derive(Debug, Serialize)]
struct CompareRequest<'a> {
    challenge_id: &'a str,
    problem_statement: &'a str,
    entrants: Vec<EntrantPayload<'a>>,
}

impl<'a> CompareRequest<'a> {
    fn new(challenge: &'a Challenge, entrants: &'a [Entrant]) -> Self {
        Self {
            challenge_id: &challenge.challenge_id,
            problem_statement: &challenge.problem_statement,
            entrants: entrants.iter().map(|e| EntrantPayload { patch: &e.patch }).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EntrantPayload<'a> {
    patch: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    ranks: Vec<u32>,
}

/// Posts comparisons to `endpoint` as JSON.
pub struct HttpJudge {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpJudge {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, JudgeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("patchgrade/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Judge for HttpJudge {
    async fn compare(&self, challenge: &Challenge, entrants: &[Entrant]) -> Result<Verdict, JudgeError> {
        let request = CompareRequest::new(challenge, entrants);

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Backend(format!("{status}: {}", body.trim())));
        }

        let parsed: CompareResponse = response.json().await?;
        debug!(endpoint = %self.endpoint, ranks = ?parsed.ranks, "judge answered");
        Ok(Verdict::from_ranks(parsed.ranks))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubmitterId;

    fn challenge() -> Challenge {
        serde_json::from_value(serde_json::json!({
            "challenge_id": "c-1",
            "repository": {"source": "/repo"},
            "problem_statement": "fix it",
            "test_command": {"program": "true"}
        }))
        .unwrap()
    }

    #[test]
    fn request_carries_patches_in_order() {
        let challenge = challenge();
        let entrants = [
            Entrant::new(SubmitterId::new("alice"), "+x"),
            Entrant::new(SubmitterId::new("bob"), "+y"),
        ];
        let json = serde_json::to_value(CompareRequest::new(&challenge, &entrants)).unwrap();
        assert_eq!(json["problem_statement"], "fix it");
        assert_eq!(json["entrants"][0]["patch"], "+x");
        assert_eq!(json["entrants"][1]["patch"], "+y");
    }

    #[test]
    fn request_does_not_name_submitters() {
        let challenge = challenge();
        let entrants = [
            Entrant::new(SubmitterId::new("alice"), "+x"),
            Entrant::new(SubmitterId::new("bob"), "+y"),
        ];
        let body = serde_json::to_string(&CompareRequest::new(&challenge, &entrants)).unwrap();
        assert!(!body.contains("submitter"), "{body}");
        assert!(!body.contains("alice") && !body.contains("bob"), "{body}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let judge = HttpJudge::new("http://127.0.0.1:9/compare", Duration::from_millis(500)).unwrap();
        let challenge = challenge();
        let entrants = [
            Entrant::new(SubmitterId::new("a"), "+x"),
            Entrant::new(SubmitterId::new("b"), "+y"),
        ];
        assert!(judge.compare(&challenge, &entrants).await.is_err());
    }
}
