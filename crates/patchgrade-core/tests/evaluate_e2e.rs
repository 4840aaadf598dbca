//! Whole-pipeline evaluations: normalize, verify, record failures, grade.

use std::path::Path;
use std::process::Command as StdCommand;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use patchgrade_core::domain::{
    Challenge, CommandSpec, EvalError, RepositorySource, Response, SandboxOutcome,
};
use patchgrade_core::grading::{Entrant, HeuristicJudge, Judge, JudgeError, Verdict, DEFAULT_BASELINE};
use patchgrade_core::sandbox::{PreparedChallenge, SandboxError, SandboxResult, Verifier};
use patchgrade_core::{EvalConfig, Evaluator};
use patchgrade_state::fakes::MemoryFailureRecorder;
use patchgrade_state::ResponseId;
use tempfile::TempDir;

// -------------------------------------------------------------------------
// Collaborators
// -------------------------------------------------------------------------

/// Verdicts keyed on patch text: "broken" fails, "crash" errors, "slow"
/// hangs. Counts calls.
#[derive(Default)]
struct ScriptedVerifier {
    calls: AtomicUsize,
    unreachable: bool,
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn prepare(&self, challenge: &Challenge) -> SandboxResult<PreparedChallenge> {
        if self.unreachable {
            return Err(SandboxError::Git {
                action: "clone".into(),
                detail: "repository not found".into(),
            });
        }
        Ok(PreparedChallenge::new(challenge.clone()))
    }

    async fn verify(&self, _: &PreparedChallenge, patch: &str) -> SandboxResult<SandboxOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if patch.contains("crash") {
            return Err(SandboxError::InvalidCommand("sandbox exploded".into()));
        }
        if patch.contains("slow") {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if patch.contains("broken") {
            return Ok(SandboxOutcome::fail("tests failed"));
        }
        Ok(SandboxOutcome::Pass)
    }
}

/// Calls every comparison a tie.
struct TieJudge;

#[async_trait]
impl Judge for TieJudge {
    async fn compare(&self, _: &Challenge, entrants: &[Entrant]) -> Result<Verdict, JudgeError> {
        Ok(Verdict::tie(entrants.len()))
    }
}

struct DownJudge;

#[async_trait]
impl Judge for DownJudge {
    async fn compare(&self, _: &Challenge, _: &[Entrant]) -> Result<Verdict, JudgeError> {
        Err(JudgeError::Unavailable("connection refused".into()))
    }
}

/// Notes whether `watch` was already recorded as failed when grading began.
struct WatchingJudge {
    failures: Arc<MemoryFailureRecorder>,
    watch: ResponseId,
    saw_failure: AtomicBool,
}

#[async_trait]
impl Judge for WatchingJudge {
    async fn compare(&self, _: &Challenge, entrants: &[Entrant]) -> Result<Verdict, JudgeError> {
        if self.failures.contains(&self.watch) {
            self.saw_failure.store(true, Ordering::SeqCst);
        }
        Ok(Verdict::tie(entrants.len()))
    }
}

fn stub_challenge() -> Challenge {
    Challenge {
        challenge_id: "stub".into(),
        repository: RepositorySource {
            source: "/repo".into(),
            base_ref: None,
        },
        problem_statement: String::new(),
        test_command: CommandSpec::new("true", &[]),
        lint_command: None,
    }
}

fn evaluator(
    config: EvalConfig,
    verifier: Arc<ScriptedVerifier>,
    judge: Arc<dyn Judge>,
    failures: Arc<MemoryFailureRecorder>,
) -> Evaluator {
    Evaluator::new(config, verifier, judge, failures).unwrap()
}

// -------------------------------------------------------------------------
// A real repository for the sandboxed scenarios
// -------------------------------------------------------------------------

const GREET: &str = "def greet(name):\n    return 'hi'\n";

const TEST_SH: &str = "#!/bin/sh
grep -q 'hello, ' greet.py || { echo 'FAILED test_greet.py::test_greet'; exit 1; }
";

fn run_git(repo_dir: &Path, args: &[&str]) {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn make_repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "--quiet"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    std::fs::write(dir.path().join("greet.py"), GREET).unwrap();
    std::fs::write(dir.path().join("test.sh"), TEST_SH).unwrap();
    run_git(dir.path(), &["add", "."]);
    run_git(dir.path(), &["commit", "--quiet", "-m", "initial"]);
    dir
}

fn repo_challenge(repo: &Path) -> Challenge {
    Challenge {
        challenge_id: "greet".into(),
        repository: RepositorySource {
            source: repo.to_string_lossy().to_string(),
            base_ref: None,
        },
        problem_statement: "greet() should say hello".into(),
        test_command: CommandSpec::new("sh", &["test.sh"]),
        lint_command: None,
    }
}

fn greet_patch(body: &str) -> String {
    format!(
        "diff --git a/greet.py b/greet.py
--- a/greet.py
+++ b/greet.py
@@ -1,2 +1,2 @@
 def greet(name):
-    return 'hi'
{body}"
    )
}

// -------------------------------------------------------------------------
// Scenarios
// -------------------------------------------------------------------------

#[tokio::test]
async fn tied_survivors_share_a_score_and_the_failure_is_recorded_once() {
    let repo = make_repo();
    let failures = Arc::new(MemoryFailureRecorder::new());
    let evaluator = Evaluator::with_sandbox(EvalConfig::default(), Arc::new(TieJudge), failures.clone()).unwrap();

    let stale = "diff --git a/greet.py b/greet.py
--- a/greet.py
+++ b/greet.py
@@ -1,2 +1,2 @@
 def greet(name):
-    return 'howdy'
+    return 'hello, ' + name
";
    let mut responses = vec![
        Response::new("r-alice", "alice", greet_patch("+    return 'hello, ' + name\n")),
        Response::new("r-bob", "bob", greet_patch("+    return f'hello, {name}'\n")),
        Response::new("r-carol", "carol", stale),
    ];

    let results = evaluator.evaluate(&repo_challenge(repo.path()), &mut responses).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].submitter.as_str(), "alice");
    assert_eq!(results[1].submitter.as_str(), "bob");
    assert_eq!(results[0].score, results[1].score);
    assert!(results[0].score > DEFAULT_BASELINE);

    let carol = ResponseId::new("r-carol");
    assert_eq!(failures.call_count(&carol), 1);
    assert_eq!(failures.recorded(), vec![carol]);
}

#[tokio::test]
async fn normalized_patch_still_passes_the_suite() {
    let repo = make_repo();
    let failures = Arc::new(MemoryFailureRecorder::new());
    let evaluator = Evaluator::with_sandbox(EvalConfig::default(), Arc::new(HeuristicJudge), failures.clone()).unwrap();

    let commented = "diff --git a/greet.py b/greet.py
--- a/greet.py
+++ b/greet.py
@@ -1,2 +1,3 @@
 def greet(name):
-    return 'hi'
+    # say hello properly
+    return 'hello, ' + name  # greeting
";
    let mut responses = vec![Response::new("r1", "alice", commented)];
    let results = evaluator.evaluate(&repo_challenge(repo.path()), &mut responses).await.unwrap();

    let normalized = responses[0].normalized_patch.as_deref().unwrap();
    assert!(!normalized.contains('#'), "{normalized}");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score, DEFAULT_BASELINE);
    assert!(failures.recorded().is_empty());
}

#[tokio::test]
async fn bypass_skips_the_pipeline() {
    let verifier = Arc::new(ScriptedVerifier::default());
    let failures = Arc::new(MemoryFailureRecorder::new());
    let config = EvalConfig {
        bypass: true,
        ..EvalConfig::default()
    };
    let evaluator = evaluator(config, verifier.clone(), Arc::new(DownJudge), failures.clone());

    let mut responses = vec![
        Response::new("r1", "alice", "broken"),
        Response::new("r2", "bob", "+x"),
    ];
    let results = evaluator.evaluate(&stub_challenge(), &mut responses).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.score == 5.0));
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    assert!(responses.iter().all(|r| r.normalized_patch.is_none()));
    assert!(failures.recorded().is_empty());
}

#[tokio::test]
async fn failing_judge_leaves_both_at_baseline() {
    let evaluator = evaluator(
        EvalConfig::default(),
        Arc::new(ScriptedVerifier::default()),
        Arc::new(DownJudge),
        Arc::new(MemoryFailureRecorder::new()),
    );
    let mut responses = vec![
        Response::new("r1", "alice", "+a"),
        Response::new("r2", "bob", "+b"),
    ];
    let results = evaluator.evaluate(&stub_challenge(), &mut responses).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.score == DEFAULT_BASELINE));
}

#[tokio::test]
async fn failures_are_recorded_before_grading() {
    let failures = Arc::new(MemoryFailureRecorder::new());
    let judge = Arc::new(WatchingJudge {
        failures: failures.clone(),
        watch: ResponseId::new("r-bad"),
        saw_failure: AtomicBool::new(false),
    });
    let evaluator = evaluator(
        EvalConfig::default(),
        Arc::new(ScriptedVerifier::default()),
        judge.clone(),
        failures,
    );
    let mut responses = vec![
        Response::new("r1", "alice", "+a"),
        Response::new("r-bad", "mallory", "broken"),
        Response::new("r2", "bob", "+b"),
    ];
    evaluator.evaluate(&stub_challenge(), &mut responses).await.unwrap();
    assert!(judge.saw_failure.load(Ordering::SeqCst));
}

#[tokio::test]
async fn infrastructure_errors_drop_the_response() {
    let failures = Arc::new(MemoryFailureRecorder::new());
    let evaluator = evaluator(
        EvalConfig::default(),
        Arc::new(ScriptedVerifier::default()),
        Arc::new(HeuristicJudge),
        failures.clone(),
    );
    let mut responses = vec![
        Response::new("r1", "alice", "+a"),
        Response::new("r2", "bob", "crash"),
    ];
    let results = evaluator.evaluate(&stub_challenge(), &mut responses).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].submitter.as_str(), "alice");
    assert!(failures.contains(&ResponseId::new("r2")));
}

#[tokio::test]
async fn hung_verification_is_cut_off() {
    let failures = Arc::new(MemoryFailureRecorder::new());
    let config = EvalConfig {
        verification_timeout_secs: 1,
        ..EvalConfig::default()
    };
    let evaluator = evaluator(
        config,
        Arc::new(ScriptedVerifier::default()),
        Arc::new(HeuristicJudge),
        failures.clone(),
    );
    let mut responses = vec![
        Response::new("r1", "alice", "+a"),
        Response::new("r2", "bob", "slow"),
    ];
    let results = evaluator.evaluate(&stub_challenge(), &mut responses).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(failures.contains(&ResponseId::new("r2")));
}

#[tokio::test]
async fn unreachable_reference_aborts_without_recording() {
    let failures = Arc::new(MemoryFailureRecorder::new());
    let verifier = Arc::new(ScriptedVerifier {
        unreachable: true,
        ..ScriptedVerifier::default()
    });
    let evaluator = evaluator(EvalConfig::default(), verifier, Arc::new(HeuristicJudge), failures.clone());
    let mut responses = vec![Response::new("r1", "alice", "+a")];
    let err = evaluator.evaluate(&stub_challenge(), &mut responses).await.unwrap_err();
    assert!(matches!(err, EvalError::ReferenceUnavailable(_)), "{err}");
    assert!(failures.recorded().is_empty());
}

#[tokio::test]
async fn no_survivors_means_no_results() {
    let failures = Arc::new(MemoryFailureRecorder::new());
    let evaluator = evaluator(
        EvalConfig::default(),
        Arc::new(ScriptedVerifier::default()),
        Arc::new(HeuristicJudge),
        failures.clone(),
    );
    let mut responses = vec![
        Response::new("r1", "alice", "broken"),
        Response::new("r2", "bob", "crash"),
    ];
    let results = evaluator.evaluate(&stub_challenge(), &mut responses).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(failures.recorded().len(), 2);
}

#[tokio::test]
async fn empty_batch_is_fine() {
    let evaluator = evaluator(
        EvalConfig::default(),
        Arc::new(ScriptedVerifier::default()),
        Arc::new(HeuristicJudge),
        Arc::new(MemoryFailureRecorder::new()),
    );
    let results = evaluator.evaluate(&stub_challenge(), &mut []).await.unwrap();
    assert!(results.is_empty());
}
