//! Configuration handling for pulse-vpn
//!
//! Two layers live here:
//!
//! - [`Config`]: the TOML file (`pulse-vpn.toml` or `~/.pulse-vpn/config.toml`)
//! - [`SessionConfig`]: the immutable per-invocation value built once from the
//!   file plus command-line overrides and handed to every component

use crate::credentials::token::{Token, TokenError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SERVER: &str = "vpn.example.org";
pub const DEFAULT_VPN_ORG: &str = "Example Organization";
pub const DEFAULT_LOOKUP_URL: &str = "https://ipinfo.io/json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
    #[error("Invalid token: {0}")]
    Token(#[from] TokenError),
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Which VPN client drives the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// The `openconnect` command-line client
    Headless,
    /// The Pulse Secure desktop client
    Gui,
}

/// How the GUI backend talks to the Pulse client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GuiMode {
    /// Operate `pulseUi` with synthetic keyboard input
    Automated,
    /// Run `pulsesvc` directly without a window
    Service,
}

/// Authentication realm (login group) on the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Realm {
    #[value(alias = "single")]
    SingleFactor,
    #[value(alias = "dual", alias = "two-factor")]
    DualFactor,
}

impl Realm {
    /// Login group name as the gateway presents it
    pub fn group_name(&self) -> &'static str {
        match self {
            Realm::SingleFactor => "Single-Factor Pulse Clients",
            Realm::DualFactor => "Two-Factor Pulse Clients",
        }
    }

    pub fn requires_token(&self) -> bool {
        matches!(self, Realm::DualFactor)
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group_name())
    }
}

/// A single connectivity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    /// Backend process presence
    Pid,
    /// Public network identity
    Ip,
}

/// Enabled subset of connectivity checks; never empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub pid: bool,
    pub ip: bool,
}

impl ValidationPolicy {
    pub const BOTH: ValidationPolicy = ValidationPolicy { pid: true, ip: true };

    pub fn from_checks(checks: &[Check]) -> Result<Self, ConfigError> {
        let policy = Self {
            pid: checks.contains(&Check::Pid),
            ip: checks.contains(&Check::Ip),
        };
        if !policy.pid && !policy.ip {
            return Err(ConfigError::InvalidValue {
                field: "validate".to_string(),
                message: "at least one of pid, ip is required".to_string(),
            });
        }
        Ok(policy)
    }

    pub fn is_enabled(&self, check: Check) -> bool {
        match check {
            Check::Pid => self.pid,
            Check::Ip => self.ip,
        }
    }
}

impl FromStr for ValidationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut checks = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part {
                "pid" => checks.push(Check::Pid),
                "ip" => checks.push(Check::Ip),
                "both" | "all" => checks.extend([Check::Pid, Check::Ip]),
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "validate".to_string(),
                        message: format!("unknown check '{}' (expected pid, ip or both)", other),
                    });
                }
            }
        }
        Self::from_checks(&checks)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vpn: VpnConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub gui: GuiConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VpnConfig {
    pub server: String,
    /// Gateway URL; derived from `server` when unset
    pub url: Option<String>,
    pub realm: Realm,
    pub backend: BackendKind,
    pub validate: Vec<Check>,
    /// Host used for `.netrc` lookups when the server has no entry
    pub default_host: String,
    pub openconnect: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub pid_file: Option<PathBuf>,
    pub identity_cache: Option<PathBuf>,
    pub netrc: Option<PathBuf>,
    pub profile_store: Option<PathBuf>,
    pub gui_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    pub mode: GuiMode,
    /// Multiplier applied to every automation delay
    pub speed: f64,
    pub skip_notification: bool,
    /// Upper bound on the login popup wait; unbounded when unset
    pub popup_timeout_secs: Option<u64>,
    pub ui_program: PathBuf,
    pub service_program: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub probe_targets: Vec<String>,
    pub lookup_url: String,
    /// Substring of the `org` field seen while tunnelled
    pub vpn_org: String,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            url: None,
            realm: Realm::SingleFactor,
            backend: BackendKind::Headless,
            validate: vec![Check::Pid, Check::Ip],
            default_host: DEFAULT_SERVER.to_string(),
            openconnect: PathBuf::from("openconnect"),
        }
    }
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            mode: GuiMode::Automated,
            speed: 1.0,
            skip_notification: false,
            popup_timeout_secs: None,
            ui_program: PathBuf::from("/usr/local/pulse/pulseUi"),
            service_program: PathBuf::from("/usr/local/pulse/pulsesvc"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_targets: vec!["1.1.1.1:53".to_string(), "8.8.8.8:53".to_string()],
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            vpn_org: DEFAULT_VPN_ORG.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vpn: VpnConfig::default(),
            paths: PathsConfig::default(),
            gui: GuiConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from an explicit path, the working directory, or the home
    /// directory, in that order; fall back to defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            info!("Loading config from {}", path.display());
            return Self::load(path);
        }

        let local_config = PathBuf::from("pulse-vpn.toml");
        if local_config.exists() {
            debug!("Loading config from {}", local_config.display());
            return Self::load(&local_config);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".pulse-vpn").join("config.toml");
            if home_config.exists() {
                debug!("Loading config from {}", home_config.display());
                return Self::load(&home_config);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Default location used by `pulse-vpn init`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".pulse-vpn").join("config.toml"))
    }
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<BackendKind>,
    pub gui_mode: Option<GuiMode>,
    pub server: Option<String>,
    pub realm: Option<Realm>,
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub validate: Option<ValidationPolicy>,
    pub speed: Option<f64>,
    pub skip_notification: bool,
    pub force: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub extra_args: Vec<String>,
}

/// Everything one invocation needs; built once, never mutated
#[derive(Clone)]
pub struct SessionConfig {
    pub backend: BackendKind,
    pub gui_mode: GuiMode,
    pub server: String,
    pub default_host: String,
    pub realm: Realm,
    pub url: String,
    pub validation: ValidationPolicy,
    pub speed: f64,
    pub force: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub skip_notification: bool,
    pub popup_timeout: Option<Duration>,
    pub extra_args: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token: Option<Token>,
    pub pid_file: PathBuf,
    pub identity_cache: PathBuf,
    pub netrc: PathBuf,
    pub profile_store: PathBuf,
    pub gui_log: PathBuf,
    pub openconnect_program: PathBuf,
    pub ui_program: PathBuf,
    pub service_program: PathBuf,
    pub probe_targets: Vec<String>,
    pub lookup_url: String,
    pub vpn_org: String,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("backend", &self.backend)
            .field("gui_mode", &self.gui_mode)
            .field("server", &self.server)
            .field("realm", &self.realm)
            .field("url", &self.url)
            .field("validation", &self.validation)
            .field("speed", &self.speed)
            .field("force", &self.force)
            .field("dry_run", &self.dry_run)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|t| t.kind()))
            .field("pid_file", &self.pid_file)
            .field("identity_cache", &self.identity_cache)
            .finish_non_exhaustive()
    }
}

impl SessionConfig {
    pub fn build(config: &Config, overrides: Overrides) -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        let pulse_dir = home.join(".pulse_secure").join("pulse");

        let server = overrides.server.unwrap_or_else(|| config.vpn.server.clone());
        let url = overrides
            .url
            .or_else(|| config.vpn.url.clone())
            .unwrap_or_else(|| format!("https://{}", server));

        let validation = match overrides.validate {
            Some(policy) => policy,
            None => ValidationPolicy::from_checks(&config.vpn.validate)?,
        };

        let speed = overrides.speed.unwrap_or(config.gui.speed);
        if !(speed.is_finite() && speed > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "speed".to_string(),
                message: format!("{} is not a positive number", speed),
            });
        }

        let token = overrides.token.as_deref().map(Token::parse).transpose()?;

        let paths = &config.paths;
        Ok(Self {
            backend: overrides.backend.unwrap_or(config.vpn.backend),
            gui_mode: overrides.gui_mode.unwrap_or(config.gui.mode),
            server,
            default_host: config.vpn.default_host.clone(),
            realm: overrides.realm.unwrap_or(config.vpn.realm),
            url,
            validation,
            speed,
            force: overrides.force,
            dry_run: overrides.dry_run,
            verbose: overrides.verbose,
            skip_notification: overrides.skip_notification || config.gui.skip_notification,
            popup_timeout: config.gui.popup_timeout_secs.map(Duration::from_secs),
            extra_args: overrides.extra_args,
            user: overrides.user,
            password: overrides.password,
            token,
            pid_file: paths
                .pid_file
                .clone()
                .unwrap_or_else(|| PathBuf::from("/var/run/pulse-vpn-openconnect.pid")),
            identity_cache: paths.identity_cache.clone().unwrap_or_else(|| {
                dirs::runtime_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("pulse-vpn")
                    .join("identity.json")
            }),
            netrc: paths.netrc.clone().unwrap_or_else(|| home.join(".netrc")),
            profile_store: paths
                .profile_store
                .clone()
                .unwrap_or_else(|| pulse_dir.join(".pulse_Connections.txt")),
            gui_log: paths
                .gui_log
                .clone()
                .unwrap_or_else(|| pulse_dir.join("pulsesvc.log")),
            openconnect_program: config.vpn.openconnect.clone(),
            ui_program: config.gui.ui_program.clone(),
            service_program: config.gui.service_program.clone(),
            probe_targets: config.network.probe_targets.clone(),
            lookup_url: config.network.lookup_url.clone(),
            vpn_org: config.network.vpn_org.clone(),
        })
    }

    /// Scale a base automation delay by the configured speed multiplier
    pub fn scaled(&self, base: Duration) -> Duration {
        base.mul_f64(self.speed)
    }
}
