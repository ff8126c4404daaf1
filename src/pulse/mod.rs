//! GUI backend: the Pulse Secure desktop client
//!
//! The client is two programs: `pulseUi`, the window the user clicks
//! through, and `pulsesvc`, the service that owns the tunnel. In automated
//! mode the window is driven with synthetic input (see [`script`]); in
//! service mode `pulsesvc` is started directly and no window is involved.
//!
//! Either way the tunnel is tracked by the `pulsesvc` process name.

pub mod profiles;
pub mod script;

pub use profiles::{Profile, ProfileError, ProfileStore};
pub use script::{LoginScript, ScriptError, ScriptOptions, ScriptRunner, Step, WINDOW_TITLE};

use crate::config::{BackendKind, GuiMode, SessionConfig};
use crate::credentials::{validate_request, CredentialError, CredentialResolver, Credentials, Prompter};
use crate::network::{ConnectivityProber, IdentityLookup};
use crate::platform::{Desktop, PlatformError};
use crate::process::{ProcessError, ProcessTracker};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const UI_PROCESS: &str = "pulseUi";
pub const SERVICE_PROCESS: &str = "pulsesvc";

/// How long a freshly started service must stay up to count as started
const SERVICE_SETTLE: Duration = Duration::from_secs(3);
const SERVICE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("{0}")]
    Credentials(#[from] CredentialError),
    #[error("No internet connection; cannot reach the VPN gateway")]
    Offline,
    #[error("{0}")]
    Profile(#[from] ProfileError),
    #[error("GUI automation failed: {0}")]
    Script(#[from] ScriptError),
    #[error("{0}")]
    Platform(#[from] PlatformError),
    #[error("{0}")]
    Process(#[from] ProcessError),
    #[error("pulsesvc is already running (PID {pid}); stop it first or use restart")]
    AlreadyRunning { pid: u32 },
    #[error("Failed to run {command}: {source}")]
    SpawnError { command: String, source: io::Error },
    #[error("Cannot open log file {path}: {source}")]
    LogError { path: PathBuf, source: io::Error },
    #[error("pulsesvc exited with {status}; see {log}")]
    ServiceExited { status: String, log: PathBuf },
    #[error("pulsesvc (PID {pid}) did not exit within {secs}s")]
    StopTimeout { pid: u32, secs: u64 },
}

/// Arguments for running `pulsesvc` without the window
pub fn service_args(config: &SessionConfig, credentials: &Credentials) -> Vec<String> {
    let mut args = vec![
        "-h".to_string(),
        config.server.clone(),
        "-U".to_string(),
        config.url.clone(),
    ];
    if !credentials.username.is_empty() {
        args.push("-u".to_string());
        args.push(credentials.username.clone());
    }
    args.push("-r".to_string());
    args.push(config.realm.group_name().to_string());
    if config.verbose {
        args.push("-L".to_string());
        args.push("5".to_string());
    }
    args.extend(config.extra_args.iter().cloned());
    args
}

pub struct PulseGui<'a, D: Desktop + ?Sized, L: IdentityLookup> {
    config: &'a SessionConfig,
    desktop: &'a D,
    tracker: &'a ProcessTracker,
    prober: &'a ConnectivityProber<L>,
}

impl<'a, D: Desktop + ?Sized, L: IdentityLookup> PulseGui<'a, D, L> {
    pub fn new(
        config: &'a SessionConfig,
        desktop: &'a D,
        tracker: &'a ProcessTracker,
        prober: &'a ConnectivityProber<L>,
    ) -> Self {
        Self {
            config,
            desktop,
            tracker,
            prober,
        }
    }

    pub async fn start<P: Prompter>(
        &self,
        resolver: &CredentialResolver<'_, P>,
    ) -> Result<(), PulseError> {
        validate_request(BackendKind::Gui, self.config.realm, self.config.token.as_ref())?;
        if !self.prober.is_online().await {
            return Err(PulseError::Offline);
        }

        match self.config.gui_mode {
            GuiMode::Automated => self.start_automated(resolver).await,
            GuiMode::Service => self.start_service(resolver).await,
        }
    }

    async fn start_automated<P: Prompter>(
        &self,
        resolver: &CredentialResolver<'_, P>,
    ) -> Result<(), PulseError> {
        // The script assumes a freshly opened window
        if self.desktop.is_running(UI_PROCESS) {
            if self.config.dry_run {
                println!("Would close the running {}", UI_PROCESS);
            } else {
                info!("Closing the running {} first", UI_PROCESS);
                self.close_gui()?;
                tokio::time::sleep(self.config.scaled(script::STEP_PAUSE)).await;
            }
        }

        let store = ProfileStore::new(&self.config.profile_store);
        let index = if self.config.dry_run {
            match store.locate(&self.config.url)? {
                Some(index) => index,
                None => {
                    println!("Would add a connection profile for {}", self.config.url);
                    store.list()?.len()
                }
            }
        } else {
            store.ensure(&self.config.url, &self.config.server)?
        };
        debug!("Connection profile for {} is entry {}", self.config.url, index);

        let credentials = resolver.resolve_configured()?;
        let options = ScriptOptions {
            dual_factor: self.config.realm.requires_token(),
            skip_notification: self.config.skip_notification,
            speed: self.config.speed,
        };
        let login = LoginScript::build(index, &options);

        if self.config.dry_run {
            println!("Would run {} and then:", self.config.ui_program.display());
            for step in login.steps() {
                println!("  {:?}", step);
            }
            return Ok(());
        }

        info!(
            "Connecting to {} through the Pulse Secure client as {}",
            self.config.url, credentials.username
        );
        let mut runner = ScriptRunner::new(
            self.desktop,
            &self.config.ui_program,
            self.config.popup_timeout,
        );
        runner.run(&login, &credentials).await?;
        info!("Login window closed");
        Ok(())
    }

    async fn start_service<P: Prompter>(
        &self,
        resolver: &CredentialResolver<'_, P>,
    ) -> Result<(), PulseError> {
        if let Some(handle) = self.tracker.current_pid() {
            return Err(PulseError::AlreadyRunning { pid: handle.pid() });
        }

        let credentials = resolver.resolve_configured()?;
        let args = service_args(self.config, &credentials);
        let program = self.config.service_program.display().to_string();

        if self.config.dry_run {
            println!("Would run: {} {}", program, args.join(" "));
            return Ok(());
        }

        let log = self.open_log()?;
        let log_err = log.try_clone().map_err(|source| PulseError::LogError {
            path: self.config.gui_log.clone(),
            source,
        })?;

        info!("Starting {} for {}", SERVICE_PROCESS, self.config.url);
        let mut child = Command::new(&self.config.service_program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|source| PulseError::SpawnError {
                command: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(password) = credentials.password.as_deref() {
                stdin
                    .write_all(format!("{}\n", password).as_bytes())
                    .await
                    .map_err(|source| PulseError::SpawnError {
                        command: program.clone(),
                        source,
                    })?;
            }
            drop(stdin);
        }

        tokio::time::sleep(self.config.scaled(SERVICE_SETTLE)).await;
        match child.try_wait() {
            Ok(Some(status)) if !status.success() => Err(PulseError::ServiceExited {
                status: status.to_string(),
                log: self.config.gui_log.clone(),
            }),
            Ok(_) => {
                info!("{} is running (output in {})", SERVICE_PROCESS, self.config.gui_log.display());
                Ok(())
            }
            Err(source) => Err(PulseError::SpawnError {
                command: program,
                source,
            }),
        }
    }

    fn open_log(&self) -> Result<fs::File, PulseError> {
        let path = &self.config.gui_log;
        let log_error = |source| PulseError::LogError {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(log_error)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(log_error)
    }

    pub async fn stop(&self) -> Result<(), PulseError> {
        if self.config.dry_run {
            println!("Would close {} and run: {} -K", UI_PROCESS, self.config.service_program.display());
            return Ok(());
        }

        self.close_gui()?;

        let Some(handle) = self.tracker.current_pid() else {
            warn!("{} is not running", SERVICE_PROCESS);
            return Ok(());
        };

        self.terminate_service().await?;
        let exited = handle.wait_for_exit(SERVICE_STOP_TIMEOUT).await;

        if !exited {
            return Err(PulseError::StopTimeout {
                pid: handle.pid(),
                secs: SERVICE_STOP_TIMEOUT.as_secs(),
            });
        }
        info!("{} (PID {}) stopped", SERVICE_PROCESS, handle.pid());
        Ok(())
    }

    async fn terminate_service(&self) -> Result<(), PulseError> {
        let quit = Command::new(&self.config.service_program)
            .arg("-K")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match quit {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => warn!("{} -K exited with {}", SERVICE_PROCESS, status),
            Err(e) => warn!("Cannot run {} -K: {}", SERVICE_PROCESS, e),
        }

        info!("Terminating {} with pkill", SERVICE_PROCESS);
        let status = Command::new("pkill")
            .args(["-x", SERVICE_PROCESS])
            .status()
            .await
            .map_err(|source| PulseError::SpawnError {
                command: "pkill".to_string(),
                source,
            })?;
        // pkill exits 1 when nothing matched, which means the service is already gone
        if !status.success() {
            debug!("pkill -x {} exited with {}", SERVICE_PROCESS, status);
        }
        Ok(())
    }

    /// Launch the client window without logging in
    pub fn open_gui(&self) -> Result<(), PulseError> {
        if self.desktop.is_running(UI_PROCESS) {
            info!("{} is already running", UI_PROCESS);
            return Ok(());
        }
        if self.config.dry_run {
            println!("Would run {}", self.config.ui_program.display());
            return Ok(());
        }
        let pid = self.desktop.launch(&self.config.ui_program)?;
        info!("Started {} (PID {})", UI_PROCESS, pid);
        Ok(())
    }

    /// Close the client window; the tunnel is left alone
    pub fn close_gui(&self) -> Result<(), PulseError> {
        if !self.desktop.is_running(UI_PROCESS) {
            debug!("{} is not running", UI_PROCESS);
            return Ok(());
        }
        if self.config.dry_run {
            println!("Would close {}", UI_PROCESS);
            return Ok(());
        }
        self.desktop.close_windows(WINDOW_TITLE, UI_PROCESS)?;
        Ok(())
    }
}
