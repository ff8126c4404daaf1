//! Backend process tracking
//!
//! A backend instance is found either through the PID file it writes
//! (`openconnect --pid-file`) or by process name (`pulsesvc`). Either way the
//! result is a [`ProcessHandle`]: "a process is tracked" never means more than
//! "this PID is alive right now".

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to remove PID file {path}: {source}")]
    RemoveError { path: PathBuf, source: io::Error },
    #[error("Failed to run {command}: {source}")]
    SpawnError { command: String, source: io::Error },
    #[error("Could not obtain administrator privileges: {0}")]
    PrivilegeError(String),
    #[error("Failed to signal process {pid}: {message}")]
    SignalError { pid: u32, message: String },
}

/// Plain-text file holding one process id
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// PID stored in the file; `None` when missing, empty, or garbled
    pub fn read(&self) -> Option<u32> {
        let content = fs::read_to_string(&self.path).ok()?;
        match content.trim().parse::<u32>() {
            Ok(pid) if pid > 0 => Some(pid),
            _ => {
                warn!("Ignoring unreadable PID file {}", self.path.display());
                None
            }
        }
    }

    /// Delete the file; falls back to `sudo -n rm` when it belongs to root
    pub fn remove(&self) -> Result<(), ProcessError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!("Removing {} with sudo", self.path.display());
                let status = std::process::Command::new("sudo")
                    .args(["-n", "rm", "-f"])
                    .arg(&self.path)
                    .stdin(Stdio::null())
                    .status()
                    .map_err(|source| ProcessError::SpawnError {
                        command: "sudo rm".to_string(),
                        source,
                    })?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ProcessError::RemoveError {
                        path: self.path.clone(),
                        source: e,
                    })
                }
            }
            Err(source) => Err(ProcessError::RemoveError {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// A live (or recently live) external process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        is_process_alive(self.pid)
    }

    /// Send SIGINT, through sudo unless we are already root
    pub async fn interrupt(&self) -> Result<(), ProcessError> {
        info!("Sending SIGINT to process {}", self.pid);
        let output = privileged_command("kill")
            .args(["-s", "INT", &self.pid.to_string()])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ProcessError::SpawnError {
                command: "kill".to_string(),
                source,
            })?;

        if !output.status.success() && self.is_alive() {
            return Err(ProcessError::SignalError {
                pid: self.pid,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Poll until the process is gone; `false` if still alive after `timeout`
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_alive() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
        true
    }
}

/// Where to look for the backend process
#[derive(Debug, Clone)]
pub enum ProcessLocator {
    PidFile(PidFile),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct ProcessTracker {
    locator: ProcessLocator,
}

impl ProcessTracker {
    pub fn for_pid_file(path: impl Into<PathBuf>) -> Self {
        Self {
            locator: ProcessLocator::PidFile(PidFile::new(path)),
        }
    }

    pub fn for_name(name: impl Into<String>) -> Self {
        Self {
            locator: ProcessLocator::Name(name.into()),
        }
    }

    pub fn pid_file(&self) -> Option<&PidFile> {
        match &self.locator {
            ProcessLocator::PidFile(file) => Some(file),
            ProcessLocator::Name(_) => None,
        }
    }

    /// Running backend process, if any.
    ///
    /// A PID file naming a dead process is deleted on the way.
    pub fn current_pid(&self) -> Option<ProcessHandle> {
        match &self.locator {
            ProcessLocator::PidFile(file) => {
                let pid = file.read()?;
                let handle = ProcessHandle::new(pid);
                if handle.is_alive() {
                    debug!("Process {} from {} is alive", pid, file.path().display());
                    return Some(handle);
                }

                warn!(
                    "PID file {} references dead process {}, removing it",
                    file.path().display(),
                    pid
                );
                if let Err(e) = file.remove() {
                    warn!("{}", e);
                }
                None
            }
            ProcessLocator::Name(name) => find_process_by_name(name).map(ProcessHandle::new),
        }
    }
}

#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // EPERM: exists but owned by another user (openconnect runs as root)
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// First PID whose command name is exactly `name`
pub fn find_process_by_name(name: &str) -> Option<u32> {
    let output = std::process::Command::new("pgrep")
        .args(["-x", name])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(|line| line.trim().parse().ok())
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// `program` wrapped in `sudo` unless we already run as root
pub fn privileged_command(program: impl AsRef<OsStr>) -> Command {
    if is_root() {
        Command::new(program)
    } else {
        let mut cmd = Command::new("sudo");
        cmd.arg(program);
        cmd
    }
}

/// Make sure sudo will not prompt later on, asking interactively now if needed
pub async fn ensure_privileges() -> Result<(), ProcessError> {
    if is_root() {
        return Ok(());
    }

    let cached = Command::new("sudo")
        .args(["-n", "true"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|source| ProcessError::SpawnError {
            command: "sudo".to_string(),
            source,
        })?;
    if cached.success() {
        debug!("sudo credentials already cached");
        return Ok(());
    }

    info!("Administrator privileges are required");
    let status = Command::new("sudo")
        .arg("-v")
        .status()
        .await
        .map_err(|source| ProcessError::SpawnError {
            command: "sudo -v".to_string(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(ProcessError::PrivilegeError(
            "sudo authentication failed".to_string(),
        ))
    }
}
