//! Connectivity probing
//!
//! - `probe`: raw internet reachability (TCP connect with a short timeout)
//! - `identity`: public IP/hostname/org lookup with a session cache file

pub mod identity;
pub mod probe;

pub use identity::{ConnectivityProber, HttpLookup, IdentityLookup, NetworkIdentity};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("No internet connection (all reachability probes failed)")]
    Offline,
    #[error("Identity lookup failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Identity lookup returned HTTP {0}")]
    LookupStatus(u16),
    #[error("Invalid identity document: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Identity cache {path}: {source}")]
    CacheError {
        path: PathBuf,
        source: std::io::Error,
    },
}
