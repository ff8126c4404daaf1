//! Headless backend: the `openconnect` command-line client
//!
//! openconnect is started in `--background` mode with a PID file; the
//! foreground part exits once the tunnel is up (or authentication failed).
//! From then on the only link to the tunnel is the PID file.
//!
//! # Lifecycle
//!
//! `Idle → Preparing → Connecting → Connected | Failed`
//!
//! ```bash
//! sudo openconnect --protocol=pulse --background --pid-file=/var/run/pulse-vpn-openconnect.pid \
//!   --user=alice --passwd-on-stdin --quiet --authgroup="Single-Factor Pulse Clients" \
//!   https://vpn.example.org
//! ```

pub mod failure;

pub use failure::FailureCause;

use crate::config::{BackendKind, SessionConfig};
use crate::credentials::{validate_request, CredentialError, CredentialResolver, Credentials, Prompter};
use crate::network::{ConnectivityProber, IdentityLookup};
use crate::process::{ensure_privileges, privileged_command, ProcessError, ProcessTracker};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, info, warn};

/// How long `stop` waits for openconnect to exit after SIGINT
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to keep collecting stderr after the foreground process exits
const STDERR_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum OpenConnectError {
    #[error("{0}")]
    Credentials(#[from] CredentialError),
    #[error("No internet connection; cannot reach the VPN gateway")]
    Offline,
    #[error("openconnect is already running (PID {pid}); stop it first or use restart")]
    AlreadyRunning { pid: u32 },
    #[error("{0}")]
    Process(#[from] ProcessError),
    #[error("Failed to launch openconnect: {0}")]
    SpawnError(std::io::Error),
    #[error("Connection failed: {cause} ({hint})")]
    AuthFailed {
        cause: FailureCause,
        hint: &'static str,
        detail: String,
    },
    #[error(
        "openconnect (PID {pid}) did not exit within {secs}s; kill it manually with: sudo kill -9 {pid}"
    )]
    StopTimeout { pid: u32, secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Preparing,
    Connecting,
    Connected,
    Failed,
}

/// Arguments passed to openconnect (after the program name)
pub fn build_args(config: &SessionConfig, credentials: &Credentials) -> Vec<String> {
    let mut args = vec![
        "--protocol=pulse".to_string(),
        "--background".to_string(),
        format!("--pid-file={}", config.pid_file.display()),
    ];
    if !credentials.username.is_empty() {
        args.push(format!("--user={}", credentials.username));
    }
    if credentials.password.is_some() {
        args.push("--passwd-on-stdin".to_string());
    }
    if !config.verbose {
        args.push("--quiet".to_string());
    }
    args.push(format!("--authgroup={}", config.realm.group_name()));
    args.extend(config.extra_args.iter().cloned());
    args.push(config.url.clone());
    args
}

pub struct OpenConnect<'a, L: IdentityLookup> {
    config: &'a SessionConfig,
    tracker: &'a ProcessTracker,
    prober: &'a ConnectivityProber<L>,
    state: DriverState,
}

impl<'a, L: IdentityLookup> OpenConnect<'a, L> {
    pub fn new(
        config: &'a SessionConfig,
        tracker: &'a ProcessTracker,
        prober: &'a ConnectivityProber<L>,
    ) -> Self {
        Self {
            config,
            tracker,
            prober,
            state: DriverState::Idle,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn transition(&mut self, next: DriverState) {
        debug!("openconnect driver: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub async fn start<P: Prompter>(
        &mut self,
        resolver: &CredentialResolver<'_, P>,
    ) -> Result<(), OpenConnectError> {
        let result = self.try_start(resolver).await;
        if result.is_err() {
            self.transition(DriverState::Failed);
        }
        result
    }

    async fn try_start<P: Prompter>(
        &mut self,
        resolver: &CredentialResolver<'_, P>,
    ) -> Result<(), OpenConnectError> {
        self.transition(DriverState::Preparing);
        validate_request(
            BackendKind::Headless,
            self.config.realm,
            self.config.token.as_ref(),
        )?;

        if !self.prober.is_online().await {
            return Err(OpenConnectError::Offline);
        }
        if let Some(handle) = self.tracker.current_pid() {
            return Err(OpenConnectError::AlreadyRunning { pid: handle.pid() });
        }

        if !self.config.dry_run {
            ensure_privileges().await?;
        }
        let credentials = resolver.resolve_configured()?;
        let args = build_args(self.config, &credentials);

        if self.config.dry_run {
            println!(
                "Would run: sudo {} {}",
                self.config.openconnect_program.display(),
                args.join(" ")
            );
            self.transition(DriverState::Idle);
            return Ok(());
        }

        self.transition(DriverState::Connecting);
        info!("Connecting to {} as {}", self.config.url, credentials.username);
        let mut command = privileged_command(&self.config.openconnect_program);
        command.args(&args);
        let stderr = run_foreground(command, credentials.password.as_deref()).await?;

        if self.tracker.current_pid().is_none() {
            debug!("openconnect stderr:\n{}", stderr);
            return Err(failure_from_stderr(&stderr));
        }

        self.transition(DriverState::Connected);
        info!("openconnect is running in the background");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), OpenConnectError> {
        let Some(handle) = self.tracker.current_pid() else {
            warn!("openconnect is not running");
            return Ok(());
        };

        if self.config.dry_run {
            println!("Would run: sudo kill -s INT {}", handle.pid());
            return Ok(());
        }

        ensure_privileges().await?;
        handle.interrupt().await?;
        let exited = handle.wait_for_exit(STOP_TIMEOUT).await;

        if !exited {
            return Err(OpenConnectError::StopTimeout {
                pid: handle.pid(),
                secs: STOP_TIMEOUT.as_secs(),
            });
        }
        info!("openconnect (PID {}) stopped", handle.pid());

        clear_pid_file(self.tracker);
        self.transition(DriverState::Idle);
        Ok(())
    }
}

/// Run the foreground part of openconnect, returning what it wrote to stderr
///
/// The client may exit before reading the password (unreachable gateway,
/// rejected certificate); its stderr still explains why.
async fn run_foreground(
    mut command: Command,
    password: Option<&str>,
) -> Result<String, OpenConnectError> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(OpenConnectError::SpawnError)?;

    // The daemonized child may keep stderr open, so collect it on the side
    let collector = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut bytes = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut bytes).await {
                warn!("Failed to read openconnect output: {}", e);
            }
            String::from_utf8_lossy(&bytes).into_owned()
        })
    });

    if let Some(mut stdin) = child.stdin.take() {
        if let Some(password) = password {
            if let Err(e) = write_password(&mut stdin, password).await {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    return Err(OpenConnectError::SpawnError(e));
                }
                debug!("openconnect exited before reading the password");
            }
        }
        drop(stdin);
    }

    let status = child.wait().await.map_err(OpenConnectError::SpawnError)?;
    debug!("openconnect foreground process exited with {}", status);

    let stderr = match collector {
        Some(task) => match tokio::time::timeout(STDERR_GRACE, task).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("openconnect output collector failed: {}", e);
                String::new()
            }
            Err(_) => {
                debug!("openconnect output still open after {:?}", STDERR_GRACE);
                String::new()
            }
        },
        None => String::new(),
    };
    Ok(stderr)
}

async fn write_password(stdin: &mut ChildStdin, password: &str) -> io::Result<()> {
    stdin.write_all(format!("{}\n", password).as_bytes()).await?;
    stdin.flush().await
}

/// Error for a foreground run that left no background process behind
fn failure_from_stderr(stderr: &str) -> OpenConnectError {
    let cause = FailureCause::classify(stderr);
    let detail = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .to_string();
    OpenConnectError::AuthFailed {
        cause,
        hint: cause.hint(),
        detail,
    }
}

/// Remove a PID file the stopped process left behind; never fatal
fn clear_pid_file(tracker: &ProcessTracker) {
    let Some(pid_file) = tracker.pid_file().filter(|f| f.exists()) else {
        return;
    };
    warn!(
        "PID file {} outlived the process, removing it",
        pid_file.path().display()
    );
    if let Err(e) = pid_file.remove() {
        warn!("Could not remove {}: {}", pid_file.path().display(), e);
    }
}
