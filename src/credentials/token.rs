//! Second-factor token classification
//!
//! The gateway accepts either a one-time passcode or the name of a delivery
//! method. The shape of the value decides which.
//!
//! | Input | Kind |
//! |-------|------|
//! | `push` | push notification |
//! | `phone`, `phone1`..`phone9` | phone call |
//! | `sms`, `text`, `sms2`, `text3`, ... | SMS passcodes |
//! | 44 lowercase letters | YubiKey OTP |
//! | 6 or 7 digits | passcode |
//! | `false` | token disabled |

use std::fmt;
use thiserror::Error;

/// Sentinel value that turns the second factor off
pub const DISABLED_SENTINEL: &str = "false";

const YUBIKEY_LEN: usize = 44;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error(
        "unrecognized token format; expected push, phone[1-9], sms[1-9], text[1-9], \
         a 6 or 7 digit passcode, a 44 character YubiKey OTP, or 'false'"
    )]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Push,
    PhoneCall,
    Sms,
    Yubikey,
    SixDigit,
    SevenDigit,
    Disabled,
    Unknown,
}

impl TokenKind {
    /// Classify a raw token string. Total: every input maps to exactly one kind.
    pub fn classify(value: &str) -> TokenKind {
        if value == "push" {
            return TokenKind::Push;
        }
        if value == DISABLED_SENTINEL {
            return TokenKind::Disabled;
        }
        if method_with_suffix(value, &["phone"]) {
            return TokenKind::PhoneCall;
        }
        if method_with_suffix(value, &["sms", "text"]) {
            return TokenKind::Sms;
        }
        if value.len() == YUBIKEY_LEN && value.bytes().all(|b| b.is_ascii_lowercase()) {
            return TokenKind::Yubikey;
        }
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            return match value.len() {
                6 => TokenKind::SixDigit,
                7 => TokenKind::SevenDigit,
                _ => TokenKind::Unknown,
            };
        }
        TokenKind::Unknown
    }

    /// Whether the value is a delivery method rather than a passcode
    pub fn is_method(&self) -> bool {
        matches!(self, TokenKind::Push | TokenKind::PhoneCall | TokenKind::Sms)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Push => "push",
            TokenKind::PhoneCall => "phone call",
            TokenKind::Sms => "sms",
            TokenKind::Yubikey => "yubikey",
            TokenKind::SixDigit => "6-digit passcode",
            TokenKind::SevenDigit => "7-digit passcode",
            TokenKind::Disabled => "disabled",
            TokenKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// `prefix` alone or followed by a single digit 1-9
fn method_with_suffix(value: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| match value.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.len() == 1 && matches!(rest.as_bytes()[0], b'1'..=b'9'),
        None => false,
    })
}

/// A validated second-factor value. Never `Unknown`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    kind: TokenKind,
}

impl Token {
    pub fn parse(value: &str) -> Result<Self, TokenError> {
        let value = value.trim();
        match TokenKind::classify(value) {
            TokenKind::Unknown => Err(TokenError::Unrecognized),
            kind => Ok(Self {
                value: value.to_string(),
                kind,
            }),
        }
    }

    pub fn disabled() -> Self {
        Self {
            value: DISABLED_SENTINEL.to_string(),
            kind: TokenKind::Disabled,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn is_disabled(&self) -> bool {
        self.kind == TokenKind::Disabled
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token").field("kind", &self.kind).finish_non_exhaustive()
    }
}
