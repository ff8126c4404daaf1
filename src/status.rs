//! Connected/disconnected verdict
//!
//! Each check enabled by the validation policy yields its own state. The
//! session counts as connected when *any* enabled check says so.
//!
//! The same evaluation serves two callers:
//!
//! - `status`: observation only (`Expectation::None`), every line is info
//! - after `start`/`stop`: an assertion; a check contradicting the expected
//!   state is reported as an error and [`Verdict::ensure`] fails

use crate::config::{Check, ValidationPolicy};
use crate::network::{ConnectivityProber, IdentityLookup, NetworkIdentity};
use crate::process::ProcessTracker;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Expected VPN to be {expected}, but {details}")]
    Contradiction {
        expected: &'static str,
        details: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    None,
    Connected,
    Disconnected,
}

impl Expectation {
    fn contradicted_by(&self, state: CheckState) -> bool {
        matches!(
            (self, state),
            (Expectation::Connected, CheckState::Disconnected)
                | (Expectation::Disconnected, CheckState::Connected)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Connected,
    Disconnected,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub check: Check,
    pub state: CheckState,
    pub severity: Severity,
    pub message: String,
}

/// Outcome of the public identity check
#[derive(Debug, Clone)]
pub enum IdentityObservation {
    Vpn(NetworkIdentity),
    Other(NetworkIdentity),
    Unavailable(String),
}

/// Raw inputs to the verdict; `None` means the check was not run
#[derive(Debug, Clone, Default)]
pub struct Observations {
    pub process: Option<Option<u32>>,
    pub identity: Option<IdentityObservation>,
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub expectation: Expectation,
    pub checks: Vec<CheckResult>,
    pub connected: bool,
}

impl Verdict {
    /// Pure combination of observations under a policy
    pub fn combine(
        policy: ValidationPolicy,
        expectation: Expectation,
        observations: &Observations,
    ) -> Self {
        let mut checks = Vec::with_capacity(2);

        let (state, message) = if !policy.pid {
            (CheckState::Skipped, "Process check skipped".to_string())
        } else {
            match observations.process.flatten() {
                Some(pid) => (
                    CheckState::Connected,
                    format!("VPN process is running (PID {})", pid),
                ),
                None => (
                    CheckState::Disconnected,
                    "No VPN process is running".to_string(),
                ),
            }
        };
        checks.push(Self::result(Check::Pid, state, message, expectation));

        let (state, message) = if !policy.ip {
            (CheckState::Skipped, "Network identity check skipped".to_string())
        } else {
            match &observations.identity {
                Some(IdentityObservation::Vpn(identity)) => (
                    CheckState::Connected,
                    format!("Public IP {} belongs to the VPN", describe(identity)),
                ),
                Some(IdentityObservation::Other(identity)) => (
                    CheckState::Disconnected,
                    format!("Public IP {} is outside the VPN", describe(identity)),
                ),
                Some(IdentityObservation::Unavailable(reason)) => (
                    CheckState::Disconnected,
                    format!("Public identity unavailable: {}", reason),
                ),
                None => (
                    CheckState::Disconnected,
                    "Public identity was not checked".to_string(),
                ),
            }
        };
        checks.push(Self::result(Check::Ip, state, message, expectation));

        let connected = checks.iter().any(|c| c.state == CheckState::Connected);

        Self {
            expectation,
            checks,
            connected,
        }
    }

    fn result(
        check: Check,
        state: CheckState,
        message: String,
        expectation: Expectation,
    ) -> CheckResult {
        let severity = if expectation.contradicted_by(state) {
            Severity::Error
        } else {
            Severity::Info
        };
        CheckResult {
            check,
            state,
            severity,
            message,
        }
    }

    pub fn contradictions(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.severity == Severity::Error)
    }

    /// Log every check and print the summary line
    pub fn report(&self) {
        for check in &self.checks {
            match (check.state, check.severity) {
                (CheckState::Skipped, _) => debug!("{}", check.message),
                (_, Severity::Info) => info!("{}", check.message),
                (_, Severity::Error) => error!("{}", check.message),
            }
        }
        println!(
            "VPN status: {}",
            if self.connected {
                "connected"
            } else {
                "disconnected"
            }
        );
    }

    /// Fail if any check contradicts the expectation
    pub fn ensure(&self) -> Result<(), StatusError> {
        let details: Vec<&str> = self.contradictions().map(|c| c.message.as_str()).collect();
        if details.is_empty() {
            return Ok(());
        }
        let expected = match self.expectation {
            Expectation::Connected => "connected",
            Expectation::Disconnected => "disconnected",
            Expectation::None => return Ok(()),
        };
        Err(StatusError::Contradiction {
            expected,
            details: details.join("; "),
        })
    }
}

fn describe(identity: &NetworkIdentity) -> String {
    let mut out = identity.ip.clone();
    if let Some(hostname) = &identity.hostname {
        out.push_str(&format!(" [{}]", hostname));
    }
    if let Some(org) = &identity.org {
        out.push_str(&format!(" ({})", org));
    }
    out
}

pub struct StatusEngine<'a, L: IdentityLookup> {
    policy: ValidationPolicy,
    tracker: &'a ProcessTracker,
    prober: &'a ConnectivityProber<L>,
}

impl<'a, L: IdentityLookup> StatusEngine<'a, L> {
    pub fn new(
        policy: ValidationPolicy,
        tracker: &'a ProcessTracker,
        prober: &'a ConnectivityProber<L>,
    ) -> Self {
        Self {
            policy,
            tracker,
            prober,
        }
    }

    /// Run the enabled checks without reporting anything
    pub async fn observe(&self, expectation: Expectation) -> Verdict {
        let mut observations = Observations::default();

        if self.policy.is_enabled(Check::Pid) {
            observations.process = Some(self.tracker.current_pid().map(|h| h.pid()));
        }

        if self.policy.is_enabled(Check::Ip) {
            observations.identity = Some(match self.prober.identity().await {
                Ok(identity) if self.prober.matches_vpn(&identity) => {
                    IdentityObservation::Vpn(identity)
                }
                Ok(identity) => IdentityObservation::Other(identity),
                Err(e) => IdentityObservation::Unavailable(e.to_string()),
            });
        }

        Verdict::combine(self.policy, expectation, &observations)
    }

    /// Run the enabled checks and report them
    pub async fn evaluate(&self, expectation: Expectation) -> Verdict {
        let verdict = self.observe(expectation).await;
        verdict.report();
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::identity::testing::CountingLookup;
    use std::fs;
    use tempfile::TempDir;

    fn vpn_identity() -> NetworkIdentity {
        NetworkIdentity {
            ip: "203.0.113.7".to_string(),
            hostname: None,
            org: Some("AS64500 Example Organization".to_string()),
        }
    }

    fn home_identity() -> NetworkIdentity {
        NetworkIdentity {
            ip: "198.51.100.2".to_string(),
            hostname: Some("home.example.net".to_string()),
            org: Some("AS64511 Home ISP".to_string()),
        }
    }

    fn observations(pid: Option<u32>, identity: IdentityObservation) -> Observations {
        Observations {
            process: Some(pid),
            identity: Some(identity),
        }
    }

    #[test]
    fn test_any_connected_check_wins() {
        let cases = [
            (Some(42), IdentityObservation::Other(home_identity()), true),
            (None, IdentityObservation::Vpn(vpn_identity()), true),
            (Some(42), IdentityObservation::Vpn(vpn_identity()), true),
            (None, IdentityObservation::Other(home_identity()), false),
            (None, IdentityObservation::Unavailable("offline".into()), false),
        ];

        for (pid, identity, expected) in cases {
            let verdict = Verdict::combine(
                ValidationPolicy::BOTH,
                Expectation::None,
                &observations(pid, identity),
            );
            assert_eq!(verdict.connected, expected);
        }
    }

    #[test]
    fn test_disabled_checks_are_skipped() {
        let pid_only = ValidationPolicy { pid: true, ip: false };
        let verdict = Verdict::combine(
            pid_only,
            Expectation::None,
            &observations(None, IdentityObservation::Vpn(vpn_identity())),
        );

        assert!(!verdict.connected, "skipped ip check must not count");
        assert_eq!(verdict.checks[1].state, CheckState::Skipped);
    }

    #[test]
    fn test_observation_mode_never_errors() {
        let verdict = Verdict::combine(
            ValidationPolicy::BOTH,
            Expectation::None,
            &observations(Some(7), IdentityObservation::Other(home_identity())),
        );
        assert_eq!(verdict.contradictions().count(), 0);
        assert!(verdict.ensure().is_ok());
    }

    #[test]
    fn test_assertion_mode_flags_contradictions() {
        let verdict = Verdict::combine(
            ValidationPolicy::BOTH,
            Expectation::Connected,
            &observations(Some(7), IdentityObservation::Other(home_identity())),
        );

        assert!(verdict.connected);
        assert_eq!(verdict.checks[0].severity, Severity::Info);
        assert_eq!(verdict.checks[1].severity, Severity::Error);

        let err = verdict.ensure().unwrap_err();
        assert!(err.to_string().contains("Expected VPN to be connected"));
        assert!(err.to_string().contains("198.51.100.2"));
    }

    #[test]
    fn test_disconnect_assertion() {
        let verdict = Verdict::combine(
            ValidationPolicy::BOTH,
            Expectation::Disconnected,
            &observations(Some(99), IdentityObservation::Other(home_identity())),
        );
        let err = verdict.ensure().unwrap_err();
        assert!(err.to_string().contains("PID 99"));

        let verdict = Verdict::combine(
            ValidationPolicy::BOTH,
            Expectation::Disconnected,
            &observations(None, IdentityObservation::Other(home_identity())),
        );
        assert!(verdict.ensure().is_ok());
    }

    #[tokio::test]
    async fn test_engine_uses_tracker_and_prober() {
        let temp_dir = TempDir::new().unwrap();
        let pid_path = temp_dir.path().join("vpn.pid");
        fs::write(&pid_path, std::process::id().to_string()).unwrap();
        let cache = temp_dir.path().join("identity.json");
        fs::write(&cache, r#"{"ip": "198.51.100.2", "org": "AS64511 Home ISP"}"#).unwrap();

        let tracker = ProcessTracker::for_pid_file(&pid_path);
        let prober = ConnectivityProber::new(
            vec![],
            &cache,
            "Example Organization",
            CountingLookup::new("{}"),
        );
        let engine = StatusEngine::new(ValidationPolicy::BOTH, &tracker, &prober);

        let verdict = engine.evaluate(Expectation::Disconnected).await;

        assert!(verdict.connected);
        assert_eq!(verdict.checks[0].state, CheckState::Connected);
        assert_eq!(verdict.checks[1].state, CheckState::Disconnected);
        assert!(verdict.ensure().is_err());
    }
}
