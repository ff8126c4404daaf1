//! Raw reachability probe

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Try each `host:port` target in order; the first TCP connect that
/// succeeds within [`PROBE_TIMEOUT`] means we are online
pub async fn is_online(targets: &[String]) -> bool {
    for target in targets {
        match timeout(PROBE_TIMEOUT, TcpStream::connect(target.as_str())).await {
            Ok(Ok(_)) => {
                debug!("Reachability probe to {} succeeded", target);
                return true;
            }
            Ok(Err(e)) => debug!("Reachability probe to {} failed: {}", target, e),
            Err(_) => debug!("Reachability probe to {} timed out", target),
        }
    }
    false
}
