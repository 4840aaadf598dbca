//! patchgrade CLI
//!
//! The `patchgrade` command evaluates candidate patches for one challenge.
//!
//! ## Commands
//!
//! - `evaluate`: normalize, sandbox-verify and Elo-grade a batch of responses
//! - `verify`: run a single patch through the sandbox
//! - `normalize`: print the normalized form of a patch
//! - `config`: print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use patchgrade_core::metrics::METRICS;
use patchgrade_core::{
    normalize, try_normalize, Challenge, EvalConfig, Evaluator, HeuristicJudge, HttpJudge, Judge,
    Response, SandboxExecutor, SandboxOutcome,
};
use patchgrade_state::JsonlFailureRecorder;

#[derive(Parser)]
#[command(name = "patchgrade")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Comparative evaluation of untrusted code patches", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a batch of responses against one challenge
    Evaluate {
        /// Challenge definition (JSON)
        #[arg(short, long)]
        challenge: PathBuf,

        /// Responses to evaluate (JSON array)
        #[arg(short, long)]
        responses: PathBuf,

        /// Evaluation config (TOML)
        #[arg(long, env = "PATCHGRADE_CONFIG")]
        config: Option<PathBuf>,

        /// Append failed response ids to this JSON-lines file
        #[arg(long, env = "PATCHGRADE_FAILURES", default_value = "failures.jsonl")]
        failures: PathBuf,

        /// Write results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Comparison backend
        #[arg(long, value_enum, default_value = "heuristic")]
        judge: JudgeKind,

        /// Endpoint of the http judge
        #[arg(long, env = "PATCHGRADE_JUDGE_URL")]
        judge_url: Option<String>,

        /// Per-request timeout of the http judge (seconds)
        #[arg(long, default_value = "120")]
        judge_timeout_secs: u64,

        /// Skip the pipeline and give every response the bypass score
        #[arg(long, env = "PATCHGRADE_BYPASS")]
        bypass: bool,
    },

    /// Verify one patch in the sandbox
    Verify {
        /// Challenge definition (JSON)
        #[arg(short, long)]
        challenge: PathBuf,

        /// Patch file (unified diff)
        #[arg(short, long)]
        patch: PathBuf,

        /// Evaluation config (TOML)
        #[arg(long, env = "PATCHGRADE_CONFIG")]
        config: Option<PathBuf>,

        /// Verify the patch exactly as given
        #[arg(long)]
        no_normalize: bool,
    },

    /// Print the normalized form of a patch
    Normalize {
        /// Patch file, or `-` for stdin
        #[arg(default_value = "-")]
        patch: PathBuf,

        /// Fail on input that does not parse as a unified diff
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Evaluation config (TOML)
        #[arg(long, env = "PATCHGRADE_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum JudgeKind {
    /// Smaller change wins; needs no service
    Heuristic,
    /// Remote comparison service
    Http,
}

struct EvaluateArgs {
    challenge: PathBuf,
    responses: PathBuf,
    config: Option<PathBuf>,
    failures: PathBuf,
    output: Option<PathBuf>,
    judge: JudgeKind,
    judge_url: Option<String>,
    judge_timeout_secs: u64,
    bypass: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    patchgrade_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Evaluate {
            challenge,
            responses,
            config,
            failures,
            output,
            judge,
            judge_url,
            judge_timeout_secs,
            bypass,
        } => {
            cmd_evaluate(EvaluateArgs {
                challenge,
                responses,
                config,
                failures,
                output,
                judge,
                judge_url,
                judge_timeout_secs,
                bypass,
            })
            .await
        }
        Commands::Verify {
            challenge,
            patch,
            config,
            no_normalize,
        } => cmd_verify(&challenge, &patch, config.as_deref(), no_normalize).await,
        Commands::Normalize { patch, strict } => {
            let out = cmd_normalize(&patch, strict)?;
            println!("{}", out);
            Ok(())
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.bypass {
        config.bypass = true;
    }

    let challenge: Challenge = read_json(&args.challenge)?;
    let mut responses: Vec<Response> = read_json(&args.responses)?;
    let judge = build_judge(args.judge, args.judge_url.as_deref(), args.judge_timeout_secs)?;

    let failures = JsonlFailureRecorder::open(&args.failures)
        .await
        .with_context(|| format!("Failed to open failure log {:?}", args.failures))?;
    let failures = Arc::new(failures);

    let evaluator = Evaluator::with_sandbox(config, judge, failures)?;
    let results = evaluator
        .evaluate(&challenge, &mut responses)
        .await
        .with_context(|| format!("Evaluation of {} failed", challenge.challenge_id))?;

    info!(
        challenge = %challenge.challenge_id,
        responses = responses.len(),
        scored = results.len(),
        "evaluation complete"
    );
    write_json(args.output.as_deref(), &results)?;
    METRICS.flush();
    Ok(())
}

async fn cmd_verify(
    challenge_path: &Path,
    patch_path: &Path,
    config: Option<&Path>,
    no_normalize: bool,
) -> Result<()> {
    let config = load_config(config)?;
    let challenge: Challenge = read_json(challenge_path)?;
    challenge.validate()?;

    let raw = read_text(patch_path)?;
    let patch = if no_normalize { raw } else { normalize(&raw) };

    let executor = SandboxExecutor::new(config.sandbox);
    let outcome = executor
        .verify_against(&challenge, &patch)
        .await
        .context("Sandbox verification could not run")?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome {
        SandboxOutcome::Pass => Ok(()),
        SandboxOutcome::Fail { reason } => anyhow::bail!("Patch rejected: {}", reason),
    }
}

fn cmd_normalize(path: &Path, strict: bool) -> Result<String> {
    let raw = read_text(path)?;
    if strict {
        Ok(try_normalize(&raw)?)
    } else {
        Ok(normalize(&raw))
    }
}

fn build_judge(kind: JudgeKind, url: Option<&str>, timeout_secs: u64) -> Result<Arc<dyn Judge>> {
    match kind {
        JudgeKind::Heuristic => Ok(Arc::new(HeuristicJudge)),
        JudgeKind::Http => {
            let url = url.context("--judge-url is required for the http judge")?;
            let judge = HttpJudge::new(url, Duration::from_secs(timeout_secs))
                .context("Failed to build http judge")?;
            Ok(Arc::new(judge))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EvalConfig> {
    match path {
        Some(path) => EvalConfig::load(path).with_context(|| format!("Invalid config {:?}", path)),
        None => Ok(EvalConfig::default()),
    }
}

fn read_text(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = read_text(path)?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            std::fs::write(path, json + "\n").with_context(|| format!("Failed to write {:?}", path))
        }
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}
