//! Disposable working copies of the reference repository.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::debug;

use super::command::{self, CommandOutput};
use super::confine::Confinement;
use super::config::SandboxConfig;
use super::error::{SandboxError, SandboxResult};
use crate::domain::{CommandSpec, RepositorySource};

/// A fresh clone in its own temporary directory.
///
/// Layout: `repo/` holds the checkout, `home/` is `HOME` for every child,
/// and submitted patches are written next to them, outside the checkout.
/// Everything is deleted when the value drops.
#[derive(Debug)]
pub(crate) struct Workspace {
    dir: TempDir,
    repo: PathBuf,
    home: PathBuf,
    config: SandboxConfig,
    /// Applied to challenge commands, not to our own git calls.
    confinement: Confinement,
}

impl Workspace {
    /// Clone `source` and check out its base ref. The source is only read.
    pub async fn checkout(source: &RepositorySource, config: &SandboxConfig) -> SandboxResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("patchgrade-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;
        let repo = dir.path().join("repo");
        let home = dir.path().join("home");
        tokio::fs::create_dir_all(&home)
            .await
            .map_err(SandboxError::Workspace)?;

        let mut ws = Self {
            dir,
            repo,
            home,
            config: config.clone(),
            confinement: Confinement::session(),
        };

        let origin = resolve_source(&source.source);
        let target = ws.repo.to_string_lossy().to_string();
        let root = ws.dir.path().to_path_buf();
        // `--no-local` copies objects instead of hardlinking them into the
        // reference's object store.
        ws.git_checked(
            "clone",
            &["clone", "--quiet", "--no-local", origin.as_str(), target.as_str()],
            &root,
        )
        .await?;

        if let Some(base_ref) = &source.base_ref {
            let repo = ws.repo.clone();
            ws.git_checked(
                "checkout",
                &["checkout", "--quiet", "--detach", base_ref.as_str()],
                &repo,
            )
            .await?;
        }
        // Nothing in the checkout may lead back to the reference.
        let repo = ws.repo.clone();
        ws.git_checked("remote remove", &["remote", "remove", "origin"], &repo)
            .await?;

        let reference = Path::new(origin.strip_prefix("file://").unwrap_or(&origin));
        ws.confinement = Confinement::for_workspace(
            config.isolation,
            config.isolate_network,
            reference.is_absolute().then_some(reference),
            ws.dir.path(),
            &ws.repo,
        )
        .await?;

        debug!(
            source = %source.source,
            workspace = %ws.dir.path().display(),
            namespaced = ws.confinement.is_namespaced(),
            "workspace ready"
        );
        Ok(ws)
    }

    #[cfg(test)]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Contents of a file in the checkout, by repository-relative path.
    /// `None` for anything that would leave the checkout.
    pub fn read_file(&self, relative: &str, max_bytes: u64) -> Option<String> {
        let path = Path::new(relative);
        let inside = path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !inside {
            return None;
        }
        let full = self.repo.join(path);
        let meta = std::fs::symlink_metadata(&full).ok()?;
        if !meta.is_file() || meta.len() > max_bytes {
            return None;
        }
        std::fs::read_to_string(full).ok()
    }

    /// Apply a patch to the checkout.
    ///
    /// `Ok(Err(reason))` when git rejects the patch; nothing is applied in
    /// that case.
    pub async fn apply(&self, patch: &str) -> SandboxResult<Result<(), String>> {
        let patch_path = self.dir.path().join("submission.diff");
        let mut contents = patch.to_string();
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        tokio::fs::write(&patch_path, contents).await?;
        let patch_arg = patch_path.to_string_lossy().to_string();

        for check_only in [true, false] {
            let mut args = vec!["apply", "--recount", "--whitespace=nowarn"];
            if check_only {
                args.push("--check");
            }
            args.push(patch_arg.as_str());

            let out = self
                .git(&args, &self.repo, self.config.apply_timeout())
                .await?
                .ok_or_else(|| SandboxError::Timeout {
                    step: "git apply".into(),
                    secs: self.config.apply_timeout_secs,
                })?;
            if !out.passed() {
                let detail = out.combined().trim().to_string();
                return Ok(Err(if detail.is_empty() {
                    format!("git apply exited with {}", out.exit_code)
                } else {
                    detail
                }));
            }
        }
        Ok(Ok(()))
    }

    /// Run a challenge command in the checkout. `None` on timeout.
    pub async fn run(&self, spec: &CommandSpec, limit: Duration) -> SandboxResult<Option<CommandOutput>> {
        command::run(spec, &self.repo, &self.home, &self.config, limit, &self.confinement).await
    }

    async fn git(&self, args: &[&str], cwd: &Path, limit: Duration) -> SandboxResult<Option<CommandOutput>> {
        let mut spec = CommandSpec::new(self.config.git_program.clone(), args);
        spec.env.insert("GIT_TERMINAL_PROMPT".into(), "0".into());
        spec.env.insert("GIT_CONFIG_NOSYSTEM".into(), "1".into());
        command::run(&spec, cwd, &self.home, &self.config, limit, &Confinement::session()).await
    }

    async fn git_checked(&self, action: &str, args: &[&str], cwd: &Path) -> SandboxResult<CommandOutput> {
        let out = self
            .git(args, cwd, self.config.clone_timeout())
            .await?
            .ok_or_else(|| SandboxError::Timeout {
                step: format!("git {action}"),
                secs: self.config.clone_timeout_secs,
            })?;
        if !out.passed() {
            return Err(SandboxError::Git {
                action: action.to_string(),
                detail: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }
}

/// Local paths are made absolute because git runs from the workspace.
fn resolve_source(source: &str) -> String {
    let path = Path::new(source);
    if path.exists() {
        if let Ok(abs) = std::fs::canonicalize(path) {
            return abs.to_string_lossy().to_string();
        }
    }
    source.to_string()
}
