//! pulse-vpn - VPN session manager for Pulse-style gateways
//!
//! One command surface over two interchangeable clients:
//!
//! - headless: `openconnect --protocol=pulse`, run in the background with a
//!   PID file
//! - gui: the Pulse Secure desktop client, logged in by scripted keyboard
//!   input because it has no API
//!
//! # Architecture
//!
//! - `config`: Configuration file handling (TOML) and the per-run `SessionConfig`
//! - `credentials`: username/password/token resolution (flags, `.netrc`, prompt)
//! - `network`: reachability probe and public identity lookup with its cache
//! - `process`: PID file and process liveness tracking, sudo helpers
//! - `status`: connected/disconnected verdict from the enabled checks
//! - `openconnect`: headless backend
//! - `pulse`: GUI backend (connection profiles, login script)
//! - `platform`: desktop automation (xdotool on Linux)
//! - `session`: start/stop/restart/toggle orchestration
//!
//! # Usage
//!
//! ```bash
//! pulse-vpn start --user alice
//! pulse-vpn --backend gui --realm dual-factor --token push start
//! pulse-vpn status
//! ```

pub mod config;
pub mod credentials;
pub mod network;
pub mod openconnect;
pub mod platform;
pub mod process;
pub mod pulse;
pub mod session;
pub mod status;

pub use config::{Config, SessionConfig};
pub use session::{Command, ErrorKind, Session, SessionError};
