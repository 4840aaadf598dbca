//! Confinement for child processes.
//!
//! Every child becomes the leader of its own session, so a timed-out
//! command can be killed together with everything it started. On Linux,
//! test and lint commands also enter fresh user and mount namespaces:
//!
//! 1. the reference repository is covered by an empty read-only tmpfs
//! 2. the temporary directory is replaced by a tmpfs that holds only the
//!    command's own workspace, so sibling workspaces are out of reach
//! 3. `PR_SET_NO_NEW_PRIVS` is set before exec
//!
//! All paths and file contents are prepared in the parent. The hook that
//! runs between `fork` and `exec` only makes system calls.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::{Arc, Once, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{SandboxError, SandboxResult};

/// How strictly challenge commands are confined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Own session only.
    Off,
    /// Namespaces when the kernel grants them, own session otherwise.
    #[default]
    BestEffort,
    /// Refuse to run challenge commands without namespaces.
    Required,
}

/// Uid and gid the child sees inside its user namespace.
#[cfg(target_os = "linux")]
const SANDBOX_ID: u32 = 65534;

#[derive(Debug, Clone)]
pub(crate) struct Confinement {
    plan: Option<Arc<MountPlan>>,
}

impl Confinement {
    /// Own session, no namespaces. Used for our own git invocations.
    pub fn session() -> Self {
        Self { plan: None }
    }

    /// Confinement for commands run in `cwd`, inside `workspace`, with
    /// `reference` hidden.
    pub async fn for_workspace(
        mode: Isolation,
        isolate_network: bool,
        reference: Option<&Path>,
        workspace: &Path,
        cwd: &Path,
    ) -> SandboxResult<Self> {
        if mode == Isolation::Off {
            return Ok(Self::session());
        }
        if !namespaces_available().await {
            if mode == Isolation::Required {
                return Err(SandboxError::Isolation(
                    "user and mount namespaces are not available".into(),
                ));
            }
            static WARNED: Once = Once::new();
            WARNED.call_once(|| {
                warn!("namespaces unavailable; challenge commands run with session isolation only")
            });
            return Ok(Self::session());
        }

        let plan = MountPlan::new(reference, workspace, cwd, isolate_network)
            .map_err(|e| SandboxError::Isolation(e.to_string()))?;
        Ok(Self {
            plan: Some(Arc::new(plan)),
        })
    }

    pub fn is_namespaced(&self) -> bool {
        self.plan.is_some()
    }

    /// The `pre_exec` hook for a command.
    pub fn hook(&self) -> impl FnMut() -> io::Result<()> + Send + Sync + 'static {
        let plan = self.plan.clone();
        move || {
            // SAFETY: only async-signal-safe system calls on buffers that
            // were allocated before the fork.
            unsafe {
                check(libc::setsid())?;
                if let Some(plan) = &plan {
                    plan.enter()?;
                }
            }
            Ok(())
        }
    }
}

/// Whether this process may create user and mount namespaces and mount in
/// them. Checked once by starting a confined `sh`.
pub async fn namespaces_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    if let Some(available) = AVAILABLE.get() {
        return *available;
    }
    let checked = tokio::task::spawn_blocking(confined_shell_runs).await.unwrap_or(false);
    *AVAILABLE.get_or_init(|| checked)
}

#[cfg(target_os = "linux")]
fn confined_shell_runs() -> bool {
    use std::os::unix::process::CommandExt;

    let attempt = || -> io::Result<bool> {
        let workspace = tempfile::Builder::new().prefix("patchgrade-nscheck-").tempdir()?;
        let plan = MountPlan::new(None, workspace.path(), workspace.path(), false)?;
        let confinement = Confinement {
            plan: Some(Arc::new(plan)),
        };
        let mut cmd = std::process::Command::new("sh");
        cmd.args(["-c", ":"])
            .current_dir(workspace.path())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        // SAFETY: see `Confinement::hook`.
        unsafe {
            cmd.pre_exec(confinement.hook());
        }
        Ok(cmd.status()?.success())
    };
    match attempt() {
        Ok(available) => {
            debug!(available, "namespace check finished");
            available
        }
        Err(e) => {
            debug!(error = %e, "namespace check failed");
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn confined_shell_runs() -> bool {
    false
}

/// Everything the child needs to set up its namespaces.
#[derive(Debug)]
struct MountPlan {
    isolate_network: bool,
    uid_map: Vec<u8>,
    gid_map: Vec<u8>,
    /// Directories covered with an empty read-only tmpfs.
    hide: Vec<CString>,
    /// Directory replaced by a fresh tmpfs, with `keep` bound back in.
    scratch: Option<CString>,
    keep: CString,
    /// `/proc/self/fd/N` of `_keep_dir`, the bind source for `keep`.
    keep_source: CString,
    _keep_dir: File,
    cwd: CString,
}

impl MountPlan {
    fn new(reference: Option<&Path>, workspace: &Path, cwd: &Path, isolate_network: bool) -> io::Result<Self> {
        use std::os::fd::AsRawFd;

        let workspace = workspace.canonicalize()?;
        let cwd = cwd.canonicalize()?;
        let scratch = workspace.parent().filter(|p| p.parent().is_some()).map(Path::to_path_buf);

        let mut hide = Vec::new();
        if let Some(reference) = reference.filter(|r| r.is_dir()) {
            let reference = reference.canonicalize()?;
            let covered = scratch.as_deref().is_some_and(|s| reference.starts_with(s));
            if workspace.starts_with(&reference) || reference.parent().is_none() {
                warn!(
                    reference = %reference.display(),
                    "reference repository contains the workspace and cannot be hidden"
                );
            } else if !covered {
                hide.push(c_path(&reference)?);
            }
        }

        let keep_dir = File::open(&workspace)?;
        let keep_source = CString::new(format!("/proc/self/fd/{}", keep_dir.as_raw_fd()))?;

        // SAFETY: getuid and getgid cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Ok(Self {
            isolate_network,
            uid_map: id_map(uid),
            gid_map: id_map(gid),
            hide,
            scratch: scratch.as_deref().map(c_path).transpose()?,
            keep: c_path(&workspace)?,
            keep_source,
            _keep_dir: keep_dir,
            cwd: c_path(&cwd)?,
        })
    }

    /// Runs in the child between `fork` and `exec`.
    #[cfg(target_os = "linux")]
    unsafe fn enter(&self) -> io::Result<()> {
        const SETGROUPS: &[u8] = b"/proc/self/setgroups\0";
        const UID_MAP: &[u8] = b"/proc/self/uid_map\0";
        const GID_MAP: &[u8] = b"/proc/self/gid_map\0";
        const TMPFS: &[u8] = b"tmpfs\0";
        const ROOT: &[u8] = b"/\0";
        const SCRATCH_OPTS: &[u8] = b"mode=1777\0";

        let mut flags = libc::CLONE_NEWUSER | libc::CLONE_NEWNS;
        if self.isolate_network {
            flags |= libc::CLONE_NEWNET;
        }
        check(libc::unshare(flags))?;
        write_file(SETGROUPS, b"deny")?;
        write_file(UID_MAP, &self.uid_map)?;
        write_file(GID_MAP, &self.gid_map)?;

        check(libc::mount(
            std::ptr::null(),
            ROOT.as_ptr().cast(),
            std::ptr::null(),
            libc::MS_REC | libc::MS_PRIVATE,
            std::ptr::null(),
        ))?;

        for path in &self.hide {
            check(libc::mount(
                TMPFS.as_ptr().cast(),
                path.as_ptr(),
                TMPFS.as_ptr().cast(),
                libc::MS_RDONLY | libc::MS_NOSUID | libc::MS_NODEV | libc::MS_NOEXEC,
                std::ptr::null(),
            ))?;
        }

        if let Some(scratch) = &self.scratch {
            check(libc::mount(
                TMPFS.as_ptr().cast(),
                scratch.as_ptr(),
                TMPFS.as_ptr().cast(),
                libc::MS_NOSUID | libc::MS_NODEV,
                SCRATCH_OPTS.as_ptr().cast(),
            ))?;
            check(libc::mkdir(self.keep.as_ptr(), 0o700))?;
            check(libc::mount(
                self.keep_source.as_ptr(),
                self.keep.as_ptr(),
                std::ptr::null(),
                libc::MS_BIND | libc::MS_REC,
                std::ptr::null(),
            ))?;
        }

        check(libc::chdir(self.cwd.as_ptr()))?;
        let on: libc::c_ulong = 1;
        let unused: libc::c_ulong = 0;
        check(libc::prctl(libc::PR_SET_NO_NEW_PRIVS, on, unused, unused, unused))
    }

    #[cfg(not(target_os = "linux"))]
    unsafe fn enter(&self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "namespaces require Linux"))
    }
}

#[cfg(target_os = "linux")]
fn id_map(outer: u32) -> Vec<u8> {
    format!("{SANDBOX_ID} {outer} 1\n").into_bytes()
}

#[cfg(not(target_os = "linux"))]
fn id_map(outer: u32) -> Vec<u8> {
    format!("{outer} {outer} 1\n").into_bytes()
}

fn c_path(path: &Path) -> io::Result<CString> {
    Ok(CString::new(path.as_os_str().as_bytes())?)
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// `path` is nul-terminated.
#[cfg(target_os = "linux")]
unsafe fn write_file(path: &[u8], data: &[u8]) -> io::Result<()> {
    let fd = libc::open(path.as_ptr().cast(), libc::O_WRONLY | libc::O_CLOEXEC);
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let written = libc::write(fd, data.as_ptr().cast(), data.len());
    let error = io::Error::last_os_error();
    libc::close(fd);
    if written < 0 || written as usize != data.len() {
        return Err(error);
    }
    Ok(())
}

/// Kills the whole process group led by a child when dropped.
#[derive(Debug)]
pub(crate) struct GroupKill(Option<i32>);

impl GroupKill {
    pub fn new(leader: Option<u32>) -> Self {
        Self(leader.and_then(|pid| i32::try_from(pid).ok()))
    }

    pub fn kill(&mut self) {
        if let Some(pgid) = self.0.take() {
            // SAFETY: plain kill(2); ESRCH when the group is already gone.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.kill();
    }
}
