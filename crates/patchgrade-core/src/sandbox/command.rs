//! Child-process execution inside a workspace.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use super::confine::{Confinement, GroupKill};
use super::config::SandboxConfig;
use super::error::{SandboxError, SandboxResult};
use crate::domain::CommandSpec;

/// Captured result of one finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Run `spec` in `cwd` with a scrubbed environment.
///
/// Returns `Ok(None)` when `limit` elapses first. The child leads its own
/// process group, and that whole group is killed once the command is over,
/// whether it finished, timed out or was cancelled.
pub(crate) async fn run(
    spec: &CommandSpec,
    cwd: &Path,
    home: &Path,
    config: &SandboxConfig,
    limit: Duration,
    confinement: &Confinement,
) -> SandboxResult<Option<CommandOutput>> {
    if spec.program.trim().is_empty() {
        return Err(SandboxError::InvalidCommand("empty program".into()));
    }
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(cwd)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for name in &config.pass_env {
        if let Ok(value) = std::env::var(name) {
            cmd.env(name, value);
        }
    }
    cmd.envs(&config.env).envs(&spec.env).env("HOME", home);
    // SAFETY: the hook only makes async-signal-safe system calls.
    unsafe {
        cmd.pre_exec(confinement.hook());
    }

    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let mut group = GroupKill::new(child.id());
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let finished = tokio::time::timeout(limit, async {
        let (status, out, err) = tokio::join!(child.wait(), drain(stdout.as_mut()), drain(stderr.as_mut()));
        Ok::<_, std::io::Error>((status?, out?, err?))
    })
    .await;
    // Background processes the command left behind go with it.
    group.kill();

    let (status, out, err) = match finished {
        Ok(finished) => finished?,
        Err(_) => {
            let _ = child.kill().await;
            debug!(command = %spec.display(), limit_ms = limit.as_millis() as u64, "command timed out");
            return Ok(None);
        }
    };

    let result = CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&out).to_string(),
        stderr: String::from_utf8_lossy(&err).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    debug!(
        command = %spec.display(),
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
        namespaced = confinement.is_namespaced(),
        "command finished"
    );
    Ok(Some(result))
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
