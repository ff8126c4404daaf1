//! Public network identity lookup and its session cache
//!
//! The lookup service answers with a JSON document such as:
//!
//! ```json
//! {"ip": "203.0.113.7", "hostname": "vpn-pool-7.example.org", "org": "AS64500 Example Organization"}
//! ```
//!
//! The raw body is kept in a cache file until the next connect/disconnect
//! transition invalidates it.

use super::probe;
use super::NetworkError;
use serde::Deserialize;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkIdentity {
    pub ip: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
}

impl NetworkIdentity {
    pub fn parse(raw: &str) -> Result<Self, NetworkError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One request to the identity service, returning the raw body
pub trait IdentityLookup {
    fn lookup(&self) -> impl Future<Output = Result<String, NetworkError>> + Send;
}

/// HTTPS lookup against an ipinfo-style endpoint
pub struct HttpLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpLookup {
    pub fn new(url: impl Into<String>) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .user_agent(concat!("pulse-vpn/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl IdentityLookup for HttpLookup {
    async fn lookup(&self) -> Result<String, NetworkError> {
        info!("Looking up public network identity via {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::LookupStatus(status.as_u16()));
        }

        let body = response.text().await?;
        debug!("Identity response: {}", body);
        Ok(body)
    }
}

/// Reachability and identity checks sharing one cache file
pub struct ConnectivityProber<L: IdentityLookup = HttpLookup> {
    targets: Vec<String>,
    cache_path: PathBuf,
    vpn_org: String,
    lookup: L,
}

impl<L: IdentityLookup> ConnectivityProber<L> {
    pub fn new(
        targets: Vec<String>,
        cache_path: impl Into<PathBuf>,
        vpn_org: impl Into<String>,
        lookup: L,
    ) -> Self {
        Self {
            targets,
            cache_path: cache_path.into(),
            vpn_org: vpn_org.into(),
            lookup,
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub async fn is_online(&self) -> bool {
        probe::is_online(&self.targets).await
    }

    /// Cached identity, or a fresh lookup stored to the cache
    pub async fn identity(&self) -> Result<NetworkIdentity, NetworkError> {
        if let Some(raw) = self.read_cache()? {
            match NetworkIdentity::parse(&raw) {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    warn!("Discarding unreadable identity cache: {}", e);
                    self.invalidate()?;
                }
            }
        }

        if !self.is_online().await {
            return Err(NetworkError::Offline);
        }

        let raw = self.lookup.lookup().await?;
        let identity = NetworkIdentity::parse(&raw)?;
        self.write_cache(&raw)?;
        Ok(identity)
    }

    /// Whether the public identity belongs to the VPN exit network
    pub async fn is_connected_by_identity(&self) -> Result<bool, NetworkError> {
        let identity = self.identity().await?;
        Ok(self.matches_vpn(&identity))
    }

    pub fn matches_vpn(&self, identity: &NetworkIdentity) -> bool {
        identity
            .org
            .as_deref()
            .is_some_and(|org| org.contains(&self.vpn_org))
    }

    /// Forget the cached identity; a missing cache is fine
    pub fn invalidate(&self) -> Result<(), NetworkError> {
        match fs::remove_file(&self.cache_path) {
            Ok(()) => {
                debug!("Identity cache {} removed", self.cache_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(NetworkError::CacheError {
                path: self.cache_path.clone(),
                source,
            }),
        }
    }

    /// Invalidate, then look up again. Failures are logged, not returned.
    pub async fn regenerate(&self) -> Option<NetworkIdentity> {
        if let Err(e) = self.invalidate() {
            warn!("{}", e);
        }
        match self.identity().await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Could not refresh network identity: {}", e);
                None
            }
        }
    }

    fn read_cache(&self) -> Result<Option<String>, NetworkError> {
        match fs::read_to_string(&self.cache_path) {
            Ok(raw) => {
                debug!("Using cached identity from {}", self.cache_path.display());
                Ok(Some(raw))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(NetworkError::CacheError {
                path: self.cache_path.clone(),
                source,
            }),
        }
    }

    fn write_cache(&self, raw: &str) -> Result<(), NetworkError> {
        let to_err = |source| NetworkError::CacheError {
            path: self.cache_path.clone(),
            source,
        };
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).map_err(to_err)?;
        }
        fs::write(&self.cache_path, raw).map_err(to_err)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed body and counts calls
    #[derive(Clone)]
    pub struct CountingLookup {
        body: String,
        pub calls: Arc<AtomicUsize>,
    }

    impl CountingLookup {
        pub fn new(body: &str) -> Self {
            Self {
                body: body.to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IdentityLookup for CountingLookup {
        async fn lookup(&self) -> Result<String, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }
}
