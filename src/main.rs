use clap::{Args, Parser, Subcommand};
use pulse_vpn::config::{BackendKind, GuiMode, Overrides, Realm, ValidationPolicy};
use pulse_vpn::{Command, Config, ErrorKind, Session, SessionConfig, SessionError};
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "pulse-vpn")]
#[command(about = "Start, stop and check a Pulse Secure VPN session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./pulse-vpn.toml, then ~/.pulse-vpn/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct Options {
    /// VPN client to drive
    #[arg(short, long, global = true, value_enum)]
    backend: Option<BackendKind>,

    /// How the gui backend runs the Pulse client
    #[arg(long, global = true, value_enum)]
    gui_mode: Option<GuiMode>,

    /// Gateway host name
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Login realm
    #[arg(short, long, global = true, value_enum)]
    realm: Option<Realm>,

    /// Gateway URL (default: https://<server>)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Username (default: .netrc, then prompt)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Password; visible to other users in the process list, prefer .netrc
    #[arg(long, global = true)]
    password: Option<String>,

    /// Second factor: push, phone[1-9], sms[1-9], a 6/7-digit code, a
    /// YubiKey OTP, or "false" to disable
    #[arg(short, long, global = true)]
    token: Option<String>,

    /// Checks deciding whether the VPN is up: pid, ip or both
    #[arg(long, global = true)]
    validate: Option<ValidationPolicy>,

    /// Multiplier for every GUI automation delay
    #[arg(long, global = true)]
    speed: Option<f64>,

    /// The one-time notification popup was already dismissed
    #[arg(long, global = true)]
    skip_notification: bool,

    /// Act even when the VPN is already in the requested state. The headless
    /// backend still refuses to start while openconnect is running; use
    /// restart instead
    #[arg(short, long, global = true)]
    force: bool,

    /// Print what would be done without doing it
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,
}

#[derive(Args)]
struct ClientArgs {
    /// Extra arguments passed to the VPN client, after `--`
    #[arg(last = true)]
    extra: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the VPN
    Start(ClientArgs),
    /// Disconnect from the VPN
    Stop,
    /// Disconnect, then connect again
    Restart(ClientArgs),
    /// Connect if disconnected, disconnect if connected
    Toggle(ClientArgs),
    /// Show whether the VPN is connected
    Status,
    /// Show the public IP, network and backend process
    Details,
    /// Show the end of the Pulse client log
    Log,
    /// Check that the tools the backend needs are installed
    Troubleshoot,
    /// Open the Pulse Secure window without logging in
    OpenGui,
    /// Close the Pulse Secure window, leaving the tunnel alone
    CloseGui,
    /// Generate default config file
    Init,
}

impl Commands {
    /// Session command plus the extra client arguments it carries
    fn into_session_command(self) -> Option<(Command, Vec<String>)> {
        let command = match self {
            Commands::Start(args) => return Some((Command::Start, args.extra)),
            Commands::Restart(args) => return Some((Command::Restart, args.extra)),
            Commands::Toggle(args) => return Some((Command::Toggle, args.extra)),
            Commands::Stop => Command::Stop,
            Commands::Status => Command::Status,
            Commands::Details => Command::Details,
            Commands::Log => Command::Log,
            Commands::Troubleshoot => Command::Troubleshoot,
            Commands::OpenGui => Command::OpenGui,
            Commands::CloseGui => Command::CloseGui,
            Commands::Init => return None,
        };
        Some((command, Vec::new()))
    }
}

impl Options {
    fn into_overrides(self, verbose: bool, extra_args: Vec<String>) -> Overrides {
        Overrides {
            backend: self.backend,
            gui_mode: self.gui_mode,
            server: self.server,
            realm: self.realm,
            url: self.url,
            user: self.user,
            password: self.password,
            token: self.token,
            validate: self.validate,
            speed: self.speed,
            skip_notification: self.skip_notification,
            force: self.force,
            dry_run: self.dry_run,
            verbose,
            extra_args,
        }
    }
}

fn hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Environment => Some("run `pulse-vpn troubleshoot` to check the requirements"),
        ErrorKind::AutomationDesync => {
            Some("the Pulse Secure window did not match the login script; try a higher --speed")
        }
        ErrorKind::StateConflict => Some("use --force to act regardless of the current state"),
        _ => None,
    }
}

async fn run(
    config_path: Option<PathBuf>,
    overrides: Overrides,
    command: Command,
) -> Result<(), SessionError> {
    let config = Config::discover(config_path.as_deref())?;
    let session_config = SessionConfig::build(&config, overrides)?;
    debug!("{:?}", session_config);
    Session::new(session_config)?.run(command).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging; stdout is reserved for command output
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let Some((command, extra_args)) = cli.command.into_session_command() else {
        info!("Generating default config...");
        let path = match cli.config {
            Some(path) => path,
            None => Config::default_path()?,
        };
        Config::default().save(&path)?;
        println!("Created default config: {}", path.display());
        return Ok(());
    };

    let overrides = cli.options.into_overrides(cli.verbose, extra_args);
    if let Err(e) = run(cli.config, overrides, command).await {
        error!("{}", e);
        if let Some(hint) = hint(e.kind()) {
            error!("Hint: {}", hint);
        }
        std::process::exit(1);
    }

    Ok(())
}
