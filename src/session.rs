//! Session orchestration
//!
//! Every lifecycle command is planned as a list of [`Action`]s (a pure
//! function of the current state) and then applied one by one. Start and
//! stop share one shape:
//!
//! 1. observe the current state; already there and not forced → warn, done
//! 2. invalidate the identity cache
//! 3. let the backend do its work
//! 4. regenerate the cache and assert the new state with every enabled check
//!
//! The observed state has the last word: a backend that reports success
//! while a check disagrees still fails the command.

use crate::config::{BackendKind, ConfigError, SessionConfig};
use crate::credentials::{validate_request, CredentialError, CredentialResolver};
use crate::network::{ConnectivityProber, HttpLookup, IdentityLookup, NetworkError};
use crate::openconnect::{OpenConnect, OpenConnectError};
use crate::platform::{get_desktop, Desktop, PlatformError};
use crate::process::{ProcessError, ProcessTracker};
use crate::pulse::profiles::ProfileError;
use crate::pulse::{PulseError, PulseGui, ScriptError, SERVICE_PROCESS};
use crate::status::{Expectation, StatusEngine, StatusError};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Base delay between synthetic key presses, scaled by the speed setting
const KEY_DELAY: Duration = Duration::from_millis(12);

/// Lines of the GUI log shown by `log`
const LOG_TAIL_LINES: usize = 50;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Credentials(#[from] CredentialError),
    #[error("{0}")]
    Network(#[from] NetworkError),
    #[error("{0}")]
    Process(#[from] ProcessError),
    #[error("{0}")]
    Status(#[from] StatusError),
    #[error("{0}")]
    OpenConnect(#[from] OpenConnectError),
    #[error("{0}")]
    Pulse(#[from] PulseError),
    #[error("{0}")]
    Platform(#[from] PlatformError),
    #[error("'{0}' needs the gui backend")]
    GuiOnly(&'static str),
    #[error("Cannot read log {path}: {source}")]
    LogError { path: PathBuf, source: io::Error },
    #[error("Missing requirements: {}", .0.join(", "))]
    Requirements(Vec<String>),
}

/// Coarse classification used for exit handling and hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad flags or a realm/token combination that cannot work
    UserInput,
    /// Missing tools, permissions, files
    Environment,
    /// The session is not in a state the command can act on
    StateConflict,
    /// The gateway rejected the credentials
    AuthFailure,
    /// The GUI did not look the way the login script expects
    AutomationDesync,
    TransientNetwork,
}

fn credential_kind(e: &CredentialError) -> ErrorKind {
    match e {
        CredentialError::Conflict(_)
        | CredentialError::Token(_)
        | CredentialError::EmptyUsername => ErrorKind::UserInput,
        CredentialError::Store(_) | CredentialError::Prompt(_) => ErrorKind::Environment,
    }
}

fn network_kind(e: &NetworkError) -> ErrorKind {
    match e {
        NetworkError::CacheError { .. } => ErrorKind::Environment,
        NetworkError::Offline
        | NetworkError::HttpError(_)
        | NetworkError::LookupStatus(_)
        | NetworkError::ParseError(_) => ErrorKind::TransientNetwork,
    }
}

fn platform_kind(e: &PlatformError) -> ErrorKind {
    match e {
        PlatformError::ToolMissing(_) | PlatformError::UnsupportedPlatform => {
            ErrorKind::Environment
        }
        PlatformError::CommandFailed { .. } => ErrorKind::AutomationDesync,
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Config(ConfigError::ReadError(_) | ConfigError::NoHomeDir) => {
                ErrorKind::Environment
            }
            SessionError::Config(_) => ErrorKind::UserInput,
            SessionError::Credentials(e) => credential_kind(e),
            SessionError::Network(e) => network_kind(e),
            SessionError::Process(_) => ErrorKind::Environment,
            SessionError::Status(_) => ErrorKind::StateConflict,
            SessionError::OpenConnect(e) => match e {
                OpenConnectError::Credentials(e) => credential_kind(e),
                OpenConnectError::Offline => ErrorKind::TransientNetwork,
                OpenConnectError::AlreadyRunning { .. } | OpenConnectError::StopTimeout { .. } => {
                    ErrorKind::StateConflict
                }
                OpenConnectError::Process(_) | OpenConnectError::SpawnError(_) => {
                    ErrorKind::Environment
                }
                OpenConnectError::AuthFailed { .. } => ErrorKind::AuthFailure,
            },
            SessionError::Pulse(e) => match e {
                PulseError::Credentials(e) => credential_kind(e),
                PulseError::Offline => ErrorKind::TransientNetwork,
                PulseError::Profile(ProfileError::Duplicate { .. } | ProfileError::NotCreated(_)) => {
                    ErrorKind::AutomationDesync
                }
                PulseError::Profile(_) => ErrorKind::Environment,
                PulseError::Script(ScriptError::Platform(e)) | PulseError::Platform(e) => {
                    platform_kind(e)
                }
                PulseError::Script(_) => ErrorKind::AutomationDesync,
                PulseError::AlreadyRunning { .. } | PulseError::StopTimeout { .. } => {
                    ErrorKind::StateConflict
                }
                PulseError::Process(_)
                | PulseError::SpawnError { .. }
                | PulseError::LogError { .. }
                | PulseError::ServiceExited { .. } => ErrorKind::Environment,
            },
            SessionError::Platform(e) => platform_kind(e),
            SessionError::GuiOnly(_) => ErrorKind::UserInput,
            SessionError::LogError { .. } | SessionError::Requirements(_) => {
                ErrorKind::Environment
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Restart,
    Toggle,
    Status,
    Details,
    Log,
    Troubleshoot,
    OpenGui,
    CloseGui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start { force: bool },
    Stop { force: bool },
    Report,
    Details,
    ShowLog,
    Troubleshoot,
    OpenGui,
    CloseGui,
}

impl Command {
    /// Actions for this command given whether the VPN is currently up.
    /// Only `Toggle` looks at `connected`.
    pub fn plan(self, connected: bool) -> Vec<Action> {
        match self {
            Command::Start => vec![Action::Start { force: false }],
            Command::Stop => vec![Action::Stop { force: false }],
            Command::Restart => vec![Action::Stop { force: true }, Action::Start { force: true }],
            Command::Toggle if connected => vec![Action::Stop { force: false }],
            Command::Toggle => vec![Action::Start { force: false }],
            Command::Status => vec![Action::Report],
            Command::Details => vec![Action::Details],
            Command::Log => vec![Action::ShowLog],
            Command::Troubleshoot => vec![Action::Troubleshoot],
            Command::OpenGui => vec![Action::OpenGui],
            Command::CloseGui => vec![Action::CloseGui],
        }
    }
}

/// Whether moving towards `target` has anything to do
pub fn needs_transition(target: Expectation, connected: bool, force: bool) -> bool {
    force
        || match target {
            Expectation::Connected => !connected,
            Expectation::Disconnected => connected,
            Expectation::None => false,
        }
}

fn backend_name(backend: BackendKind) -> &'static str {
    match backend {
        BackendKind::Headless => "headless (openconnect)",
        BackendKind::Gui => "gui (Pulse Secure)",
    }
}

/// Tracker for the process that owns the tunnel
pub fn tracker_for(config: &SessionConfig) -> ProcessTracker {
    match config.backend {
        BackendKind::Headless => ProcessTracker::for_pid_file(config.pid_file.clone()),
        BackendKind::Gui => ProcessTracker::for_name(SERVICE_PROCESS),
    }
}

pub struct Session<L: IdentityLookup = HttpLookup> {
    config: SessionConfig,
    tracker: ProcessTracker,
    prober: ConnectivityProber<L>,
    desktop: Option<Box<dyn Desktop>>,
}

impl Session<HttpLookup> {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let lookup = HttpLookup::new(config.lookup_url.clone())?;
        let prober = ConnectivityProber::new(
            config.probe_targets.clone(),
            config.identity_cache.clone(),
            config.vpn_org.clone(),
            lookup,
        );
        let desktop = match config.backend {
            BackendKind::Gui => {
                let delay = config.scaled(KEY_DELAY).as_millis();
                Some(get_desktop(u64::try_from(delay).unwrap_or(u64::MAX))?)
            }
            BackendKind::Headless => None,
        };
        let tracker = tracker_for(&config);
        Ok(Self::with_parts(config, tracker, prober, desktop))
    }
}

impl<L: IdentityLookup> Session<L> {
    pub fn with_parts(
        config: SessionConfig,
        tracker: ProcessTracker,
        prober: ConnectivityProber<L>,
        desktop: Option<Box<dyn Desktop>>,
    ) -> Self {
        Self {
            config,
            tracker,
            prober,
            desktop,
        }
    }

    fn engine(&self) -> StatusEngine<'_, L> {
        StatusEngine::new(self.config.validation, &self.tracker, &self.prober)
    }

    fn gui(&self, command: &'static str) -> Result<PulseGui<'_, dyn Desktop, L>, SessionError> {
        let desktop = self.desktop.as_deref().ok_or(SessionError::GuiOnly(command))?;
        Ok(PulseGui::new(&self.config, desktop, &self.tracker, &self.prober))
    }

    pub async fn run(&self, command: Command) -> Result<(), SessionError> {
        let connected = match command {
            Command::Toggle => self.engine().observe(Expectation::None).await.connected,
            _ => false,
        };
        let actions = command.plan(connected);
        info!("{:?}: {:?}", command, actions);

        for action in actions {
            self.apply(action).await?;
        }
        Ok(())
    }

    async fn apply(&self, action: Action) -> Result<(), SessionError> {
        match action {
            Action::Start { force } => self.start(force || self.config.force).await,
            Action::Stop { force } => self.stop(force || self.config.force).await,
            Action::Report => {
                self.engine().evaluate(Expectation::None).await;
                Ok(())
            }
            Action::Details => self.details().await,
            Action::ShowLog => self.show_log(),
            Action::Troubleshoot => self.troubleshoot().await,
            Action::OpenGui => Ok(self.gui("open-gui")?.open_gui()?),
            Action::CloseGui => Ok(self.gui("close-gui")?.close_gui()?),
        }
    }

    async fn start(&self, force: bool) -> Result<(), SessionError> {
        validate_request(self.config.backend, self.config.realm, self.config.token.as_ref())?;

        let engine = self.engine();
        let before = engine.observe(Expectation::None).await;
        if !needs_transition(Expectation::Connected, before.connected, force) {
            match self.prober.identity().await {
                Ok(identity) => warn!(
                    "VPN is already connected (public IP {}); use --force to reconnect",
                    identity.ip
                ),
                Err(_) => warn!("VPN is already connected; use --force to reconnect"),
            }
            return Ok(());
        }

        if !self.config.dry_run {
            self.prober.invalidate()?;
        }

        let resolver = CredentialResolver::terminal(&self.config);
        match self.config.backend {
            BackendKind::Headless => {
                let mut driver = OpenConnect::new(&self.config, &self.tracker, &self.prober);
                driver.start(&resolver).await?;
            }
            BackendKind::Gui => self.gui("start")?.start(&resolver).await?,
        }

        if self.config.dry_run {
            return Ok(());
        }
        self.prober.regenerate().await;
        engine.evaluate(Expectation::Connected).await.ensure()?;
        Ok(())
    }

    async fn stop(&self, force: bool) -> Result<(), SessionError> {
        let engine = self.engine();
        let before = engine.observe(Expectation::None).await;
        if !needs_transition(Expectation::Disconnected, before.connected, force) {
            if self.config.backend == BackendKind::Gui {
                self.gui("stop")?.close_gui()?;
            }
            warn!("VPN is not connected");
            return Ok(());
        }

        if !self.config.dry_run {
            self.prober.invalidate()?;
        }

        match self.config.backend {
            BackendKind::Headless => {
                let mut driver = OpenConnect::new(&self.config, &self.tracker, &self.prober);
                driver.stop().await?;
            }
            BackendKind::Gui => self.gui("stop")?.stop().await?,
        }

        if self.config.dry_run {
            return Ok(());
        }
        self.prober.regenerate().await;
        engine.evaluate(Expectation::Disconnected).await.ensure()?;
        Ok(())
    }

    async fn details(&self) -> Result<(), SessionError> {
        println!("Backend: {}", backend_name(self.config.backend));
        println!("Gateway: {} ({})", self.config.url, self.config.realm);
        match self.tracker.current_pid() {
            Some(handle) => println!("Process: running (PID {})", handle.pid()),
            None => println!("Process: not running"),
        }

        let identity = self.prober.identity().await?;
        println!("Public IP: {}", identity.ip);
        if let Some(hostname) = &identity.hostname {
            println!("Hostname: {}", hostname);
        }
        if let Some(org) = &identity.org {
            println!("Network: {}", org);
        }
        println!(
            "Through VPN: {}",
            if self.prober.matches_vpn(&identity) {
                "yes"
            } else {
                "no"
            }
        );
        Ok(())
    }

    fn show_log(&self) -> Result<(), SessionError> {
        if self.config.backend == BackendKind::Headless {
            println!("openconnect logs to the system journal; try: journalctl -t openconnect");
            return Ok(());
        }

        let path = &self.config.gui_log;
        let content = fs::read_to_string(path).map_err(|source| SessionError::LogError {
            path: path.clone(),
            source,
        })?;
        for line in tail(&content, LOG_TAIL_LINES) {
            println!("{}", line);
        }
        Ok(())
    }

    async fn troubleshoot(&self) -> Result<(), SessionError> {
        let mut required: Vec<String> = vec!["sudo".to_string(), "pgrep".to_string()];
        match self.config.backend {
            BackendKind::Headless => {
                required.push(self.config.openconnect_program.display().to_string());
            }
            BackendKind::Gui => {
                required.push(self.config.ui_program.display().to_string());
                required.push(self.config.service_program.display().to_string());
                required.push("xdotool".to_string());
                required.push("pkill".to_string());
            }
        }

        let mut missing = Vec::new();
        for program in &required {
            let found = is_installed(program);
            println!("{:<32} {}", program, if found { "ok" } else { "MISSING" });
            if !found {
                missing.push(program.clone());
            }
        }

        if self.config.backend == BackendKind::Gui && !is_installed("wmctrl") {
            println!("{:<32} not installed (windows will be closed with pkill)", "wmctrl");
        }
        println!(
            "{:<32} {}",
            self.config.netrc.display(),
            if self.config.netrc.exists() {
                "found"
            } else {
                "not found (credentials will be prompted)"
            }
        );
        println!(
            "{:<32} {}",
            "internet",
            if self.prober.is_online().await {
                "reachable"
            } else {
                "unreachable"
            }
        );

        if missing.is_empty() {
            println!("All requirements found");
            Ok(())
        } else {
            Err(SessionError::Requirements(missing))
        }
    }
}

/// Last `count` lines of `content`
fn tail(content: &str, count: usize) -> Vec<&str> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].to_vec()
}

/// Whether `program` resolves to an executable, as a path or via `PATH`
fn is_installed(program: &str) -> bool {
    which::which(program).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Overrides, ValidationPolicy};
    use crate::network::identity::testing::CountingLookup;
    use crate::pulse::script::testing::FakeDesktop;
    use crate::pulse::UI_PROCESS;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    const VPN_BODY: &str = r#"{"ip": "203.0.113.7", "org": "AS64500 Example Organization"}"#;
    const HOME_BODY: &str = r#"{"ip": "198.51.100.20", "org": "AS64496 Home ISP"}"#;

    struct Fixture {
        temp_dir: TempDir,
        lookup: CountingLookup,
        probe_targets: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp_dir: TempDir::new().unwrap(),
                lookup: CountingLookup::new(VPN_BODY),
                probe_targets: vec![],
            }
        }

        /// Online fixture whose identity lookups answer with `body`
        fn online(gateway: &TcpListener, body: &str) -> Self {
            Self {
                temp_dir: TempDir::new().unwrap(),
                lookup: CountingLookup::new(body),
                probe_targets: vec![gateway.local_addr().unwrap().to_string()],
            }
        }

        fn profile_store(&self) -> PathBuf {
            self.temp_dir.path().join(".pulse_Connections.txt")
        }

        fn cache(&self) -> PathBuf {
            self.temp_dir.path().join("identity.json")
        }

        fn session(
            &self,
            overrides: Overrides,
            desktop: Option<Box<dyn Desktop>>,
        ) -> Session<CountingLookup> {
            let mut config = Config::default();
            config.paths.pid_file = Some(self.temp_dir.path().join("openconnect.pid"));
            config.paths.identity_cache = Some(self.cache());
            config.paths.gui_log = Some(self.temp_dir.path().join("pulsesvc.log"));
            config.paths.profile_store = Some(self.profile_store());
            config.network.probe_targets = self.probe_targets.clone();
            let config = SessionConfig::build(&config, overrides).unwrap();

            let prober = ConnectivityProber::new(
                self.probe_targets.clone(),
                self.cache(),
                "Example Organization",
                self.lookup.clone(),
            );
            let tracker = tracker_for(&config);
            Session::with_parts(config, tracker, prober, desktop)
        }
    }

    fn ip_only() -> Option<ValidationPolicy> {
        Some(ValidationPolicy { pid: false, ip: true })
    }

    #[test]
    fn test_plan_lifecycle() {
        assert_eq!(Command::Start.plan(true), vec![Action::Start { force: false }]);
        assert_eq!(Command::Stop.plan(false), vec![Action::Stop { force: false }]);
        assert_eq!(Command::Status.plan(true), vec![Action::Report]);
        assert_eq!(Command::Toggle.plan(true), vec![Action::Stop { force: false }]);
        assert_eq!(Command::Toggle.plan(false), vec![Action::Start { force: false }]);
    }

    #[test]
    fn test_restart_is_forced_stop_then_start() {
        for connected in [true, false] {
            let plan = Command::Restart.plan(connected);
            assert_eq!(
                plan,
                vec![Action::Stop { force: true }, Action::Start { force: true }]
            );
        }
    }

    #[test]
    fn test_needs_transition() {
        assert!(!needs_transition(Expectation::Connected, true, false));
        assert!(needs_transition(Expectation::Connected, true, true));
        assert!(needs_transition(Expectation::Connected, false, false));
        assert!(!needs_transition(Expectation::Disconnected, false, false));
        assert!(needs_transition(Expectation::Disconnected, false, true));
        assert!(needs_transition(Expectation::Disconnected, true, false));
    }

    #[test]
    fn test_tail() {
        let content = "a\nb\nc\nd\n";
        assert_eq!(tail(content, 2), vec!["c", "d"]);
        assert_eq!(tail(content, 10), vec!["a", "b", "c", "d"]);
        assert!(tail("", 3).is_empty());
    }

    #[test]
    fn test_is_installed() {
        let temp_dir = TempDir::new().unwrap();
        let program = temp_dir.path().join("pulseUi");
        fs::write(&program, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        let not_executable = temp_dir.path().join("pulsesvc");
        fs::write(&not_executable, "").unwrap();
        fs::set_permissions(&not_executable, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(is_installed(&program.display().to_string()));
        assert!(!is_installed(&not_executable.display().to_string()));
        assert!(!is_installed(&temp_dir.path().join("missing").display().to_string()));
        assert!(!is_installed("surely-not-a-real-program-name"));
    }

    #[tokio::test]
    async fn test_start_when_connected_is_a_warning() {
        let fixture = Fixture::new();
        fs::write(fixture.cache(), VPN_BODY).unwrap();
        let session = fixture.session(
            Overrides {
                validate: ip_only(),
                ..Default::default()
            },
            None,
        );

        session.run(Command::Start).await.unwrap();

        assert!(fixture.cache().exists(), "cache left untouched");
        assert_eq!(fixture.lookup.count(), 0);
    }

    #[tokio::test]
    async fn test_forced_start_when_connected_reaches_backend() {
        let fixture = Fixture::new();
        fs::write(fixture.cache(), VPN_BODY).unwrap();
        let session = fixture.session(
            Overrides {
                validate: ip_only(),
                force: true,
                ..Default::default()
            },
            None,
        );

        let err = session.run(Command::Start).await.unwrap_err();

        assert!(matches!(err, SessionError::OpenConnect(OpenConnectError::Offline)));
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(!fixture.cache().exists(), "cache invalidated before the backend ran");
    }

    #[tokio::test]
    async fn test_observed_state_overrides_backend_success() {
        let gateway = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let fixture = Fixture::online(&gateway, HOME_BODY);
        fs::write(fixture.cache(), HOME_BODY).unwrap();
        let session = fixture.session(
            Overrides {
                backend: Some(BackendKind::Gui),
                validate: ip_only(),
                user: Some("alice".to_string()),
                password: Some("s3cret".to_string()),
                speed: Some(0.001),
                skip_notification: true,
                ..Default::default()
            },
            Some(Box::new(FakeDesktop::pulse_client(false, 0))),
        );

        let err = session.run(Command::Start).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Status(StatusError::Contradiction { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        // One refresh after the login script, none from the backend itself
        assert_eq!(fixture.lookup.count(), 1);
        let profiles = fs::read_to_string(fixture.profile_store()).unwrap();
        assert!(profiles.contains(r#""baseUrl":"https://vpn.example.org""#));
    }

    #[tokio::test]
    async fn test_start_validates_before_anything_else() {
        let fixture = Fixture::new();
        fs::write(fixture.cache(), HOME_BODY).unwrap();
        let session = fixture.session(
            Overrides {
                realm: Some(crate::config::Realm::DualFactor),
                ..Default::default()
            },
            None,
        );

        let err = session.run(Command::Start).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UserInput);
        assert!(fixture.cache().exists());
    }

    #[tokio::test]
    async fn test_stop_when_disconnected_closes_gui() {
        let fixture = Fixture::new();
        fs::write(fixture.cache(), HOME_BODY).unwrap();
        let desktop = FakeDesktop::default();
        desktop.running.borrow_mut().push(UI_PROCESS.to_string());
        let session = fixture.session(
            Overrides {
                backend: Some(BackendKind::Gui),
                validate: ip_only(),
                ..Default::default()
            },
            Some(Box::new(desktop)),
        );

        session.run(Command::Stop).await.unwrap();

        assert!(fixture.cache().exists());
        assert_eq!(fixture.lookup.count(), 0);
    }

    #[tokio::test]
    async fn test_toggle_when_disconnected_starts() {
        let fixture = Fixture::new();
        fs::write(fixture.cache(), HOME_BODY).unwrap();
        let session = fixture.session(
            Overrides {
                validate: ip_only(),
                ..Default::default()
            },
            None,
        );

        let err = session.run(Command::Toggle).await.unwrap_err();
        assert!(matches!(err, SessionError::OpenConnect(OpenConnectError::Offline)));
    }

    #[tokio::test]
    async fn test_gui_commands_need_gui_backend() {
        let fixture = Fixture::new();
        let session = fixture.session(Overrides::default(), None);

        let err = session.run(Command::OpenGui).await.unwrap_err();
        assert!(matches!(err, SessionError::GuiOnly("open-gui")));
        assert_eq!(err.kind(), ErrorKind::UserInput);
    }

    #[test]
    fn test_error_kinds() {
        let auth = SessionError::OpenConnect(OpenConnectError::AuthFailed {
            cause: crate::openconnect::FailureCause::CredentialsRejected,
            hint: "",
            detail: String::new(),
        });
        assert_eq!(auth.kind(), ErrorKind::AuthFailure);

        let desync = SessionError::Pulse(PulseError::Profile(ProfileError::Duplicate {
            url: "https://vpn.example.org".to_string(),
            count: 2,
        }));
        assert_eq!(desync.kind(), ErrorKind::AutomationDesync);

        let missing = SessionError::Platform(PlatformError::ToolMissing("xdotool".to_string()));
        assert_eq!(missing.kind(), ErrorKind::Environment);

        let conflict = SessionError::OpenConnect(OpenConnectError::AlreadyRunning { pid: 1 });
        assert_eq!(conflict.kind(), ErrorKind::StateConflict);
    }
}
