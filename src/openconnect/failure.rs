//! Classification of openconnect failures from its stderr

use std::fmt;

/// Checked first: a rejected second factor often also mentions the
/// generic authentication failure
const TWO_FACTOR_SIGNATURES: &[&str] = &[
    "secondary password",
    "secondary authentication",
    "invalid token",
    "token code",
    "passcode",
];

const CREDENTIAL_SIGNATURES: &[&str] = &[
    "invalid username or password",
    "username or password",
    "login failed",
    "authentication failure",
    "failed to authenticate",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    TwoFactorRejected,
    CredentialsRejected,
    Unknown,
}

impl FailureCause {
    pub fn classify(stderr: &str) -> FailureCause {
        let text = stderr.to_lowercase();
        let matches_any = |signatures: &[&str]| signatures.iter().any(|s| text.contains(s));

        if matches_any(TWO_FACTOR_SIGNATURES) {
            FailureCause::TwoFactorRejected
        } else if matches_any(CREDENTIAL_SIGNATURES) {
            FailureCause::CredentialsRejected
        } else {
            FailureCause::Unknown
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            FailureCause::TwoFactorRejected => {
                "the gateway asked for a second factor; try the gui backend with --realm dual-factor"
            }
            FailureCause::CredentialsRejected => "check the username and password",
            FailureCause::Unknown => "run with --verbose to see the openconnect output",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureCause::TwoFactorRejected => "second factor rejected",
            FailureCause::CredentialsRejected => "username or password rejected",
            FailureCause::Unknown => "unknown cause",
        };
        f.write_str(text)
    }
}
