//! Credential resolution
//!
//! Each field is taken from the first source that has it:
//!
//! 1. the command line (or config file)
//! 2. `.netrc`, keyed by server host with the default host as fallback
//! 3. an interactive prompt (password and token masked)
//!
//! Realm/token/backend combinations are checked by [`validate_request`]
//! before anything touches the network or spawns a process.

pub mod netrc;
pub mod prompt;
pub mod token;

pub use netrc::{Netrc, NetrcError};
pub use prompt::{Prompter, TerminalPrompter};
pub use token::{Token, TokenError, TokenKind};

use crate::config::{BackendKind, Realm, SessionConfig};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("{0}")]
    Conflict(String),
    #[error("Credentials store error: {0}")]
    Store(#[from] NetrcError),
    #[error("Prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
    #[error("Invalid token: {0}")]
    Token(#[from] TokenError),
    #[error("No username given")]
    EmptyUsername,
}

/// Login material for one connect operation. Never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub token: Token,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.kind())
            .finish()
    }
}

/// Reject realm/token/backend combinations that can never work
pub fn validate_request(
    backend: BackendKind,
    realm: Realm,
    token: Option<&Token>,
) -> Result<(), CredentialError> {
    let token_given = token.is_some_and(|t| !t.is_disabled());

    match (backend, realm) {
        (BackendKind::Headless, Realm::DualFactor) => {
            return Err(CredentialError::Conflict(format!(
                "the '{}' realm is not supported by the headless backend; use --backend gui",
                realm
            )));
        }
        (BackendKind::Headless, _) if token_given => {
            return Err(CredentialError::Conflict(
                "a token cannot be used with the headless backend".to_string(),
            ));
        }
        _ => {}
    }

    match realm {
        Realm::SingleFactor if token_given => Err(CredentialError::Conflict(format!(
            "a token was given but the '{}' realm does not take one",
            realm
        ))),
        Realm::DualFactor if token.is_some_and(Token::is_disabled) => {
            Err(CredentialError::Conflict(format!(
                "the '{}' realm requires a token but it was disabled",
                realm
            )))
        }
        _ => Ok(()),
    }
}

pub struct CredentialResolver<'a, P: Prompter> {
    config: &'a SessionConfig,
    prompter: P,
}

impl<'a> CredentialResolver<'a, TerminalPrompter> {
    pub fn terminal(config: &'a SessionConfig) -> Self {
        Self::new(config, TerminalPrompter)
    }
}

impl<'a, P: Prompter> CredentialResolver<'a, P> {
    pub fn new(config: &'a SessionConfig, prompter: P) -> Self {
        Self { config, prompter }
    }

    /// Resolve with the explicit values carried by the session config
    pub fn resolve_configured(&self) -> Result<Credentials, CredentialError> {
        self.resolve(
            self.config.user.as_deref(),
            self.config.password.as_deref(),
            self.config.token.as_ref(),
            self.config.realm,
        )
    }

    pub fn resolve(
        &self,
        explicit_user: Option<&str>,
        explicit_pwd: Option<&str>,
        explicit_token: Option<&Token>,
        realm: Realm,
    ) -> Result<Credentials, CredentialError> {
        let store = if explicit_user.is_none() || explicit_pwd.is_none() {
            let netrc = Netrc::load(&self.config.netrc)?;
            netrc
                .lookup(&self.config.server, &self.config.default_host)
                .cloned()
        } else {
            None
        };
        let store = store.unwrap_or_default();

        let username = match explicit_user.map(str::to_string).or(store.login) {
            Some(user) => user,
            None => self
                .prompter
                .prompt_line(&format!("Username for {}: ", self.config.server))?,
        };
        if username.is_empty() {
            return Err(CredentialError::EmptyUsername);
        }

        let password = match explicit_pwd.map(str::to_string).or(store.password) {
            Some(pwd) => Some(pwd),
            None => Some(
                self.prompter
                    .prompt_secret(&format!("Password for {}: ", username))?,
            ),
        }
        .filter(|p| !p.is_empty());

        let token = if realm.requires_token() {
            match explicit_token {
                Some(token) => token.clone(),
                None => {
                    let entered = self
                        .prompter
                        .prompt_secret("Token (push, phone, sms or passcode): ")?;
                    Token::parse(&entered)?
                }
            }
        } else {
            Token::disabled()
        };

        if realm.requires_token() && token.is_disabled() {
            return Err(CredentialError::Conflict(format!(
                "the '{}' realm requires a token",
                realm
            )));
        }

        info!(
            "Credentials resolved for {} (password: {}, token: {})",
            username,
            if password.is_some() { "set" } else { "none" },
            token.kind()
        );
        debug!("Realm: {}", realm);

        Ok(Credentials {
            username,
            password,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::prompt::testing::ScriptedPrompter;
    use super::*;
    use crate::config::{Config, Overrides};
    use std::fs;
    use tempfile::TempDir;

    fn session(temp_dir: &TempDir, netrc: Option<&str>, overrides: Overrides) -> SessionConfig {
        let mut config = Config::default();
        let path = temp_dir.path().join(".netrc");
        if let Some(content) = netrc {
            fs::write(&path, content).unwrap();
        }
        config.paths.netrc = Some(path);
        SessionConfig::build(&config, overrides).unwrap()
    }

    #[test]
    fn test_single_factor_with_token_rejected() {
        let token = Token::parse("123456").unwrap();
        let result = validate_request(BackendKind::Gui, Realm::SingleFactor, Some(&token));
        assert!(matches!(result, Err(CredentialError::Conflict(_))));

        let result = validate_request(BackendKind::Headless, Realm::SingleFactor, Some(&token));
        assert!(matches!(result, Err(CredentialError::Conflict(_))));
    }

    #[test]
    fn test_dual_factor_rules() {
        let disabled = Token::disabled();
        let push = Token::parse("push").unwrap();

        assert!(validate_request(BackendKind::Gui, Realm::DualFactor, Some(&disabled)).is_err());
        assert!(validate_request(BackendKind::Gui, Realm::DualFactor, Some(&push)).is_ok());
        assert!(validate_request(BackendKind::Gui, Realm::DualFactor, None).is_ok());
        assert!(validate_request(BackendKind::Headless, Realm::DualFactor, None).is_err());
    }

    #[test]
    fn test_headless_single_factor_without_token_ok() {
        assert!(validate_request(BackendKind::Headless, Realm::SingleFactor, None).is_ok());
        let disabled = Token::disabled();
        assert!(
            validate_request(BackendKind::Headless, Realm::SingleFactor, Some(&disabled)).is_ok()
        );
    }

    #[test]
    fn test_explicit_values_win() {
        let temp_dir = TempDir::new().unwrap();
        let config = session(
            &temp_dir,
            Some("machine vpn.example.org login netrc-user password netrc-pw\n"),
            Overrides::default(),
        );
        let prompter = ScriptedPrompter::new(&[]);
        let resolver = CredentialResolver::new(&config, prompter);

        let creds = resolver
            .resolve(Some("alice"), Some("pw"), None, Realm::SingleFactor)
            .unwrap();

        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password.as_deref(), Some("pw"));
        assert!(creds.token.is_disabled());
        assert!(resolver.prompter.asked.borrow().is_empty());
    }

    #[test]
    fn test_netrc_fills_missing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let config = session(
            &temp_dir,
            Some("machine vpn.example.org login bob password from-netrc\n"),
            Overrides::default(),
        );
        let resolver = CredentialResolver::new(&config, ScriptedPrompter::new(&[]));

        let creds = resolver.resolve(None, None, None, Realm::SingleFactor).unwrap();

        assert_eq!(creds.username, "bob");
        assert_eq!(creds.password.as_deref(), Some("from-netrc"));
    }

    #[test]
    fn test_prompts_when_nothing_stored() {
        let temp_dir = TempDir::new().unwrap();
        let config = session(&temp_dir, None, Overrides::default());
        let resolver =
            CredentialResolver::new(&config, ScriptedPrompter::new(&["carol", "pw", "phone2"]));

        let creds = resolver.resolve(None, None, None, Realm::DualFactor).unwrap();

        assert_eq!(creds.username, "carol");
        assert_eq!(creds.password.as_deref(), Some("pw"));
        assert_eq!(creds.token.kind(), TokenKind::PhoneCall);

        let asked = resolver.prompter.asked.borrow();
        assert_eq!(asked.len(), 3);
        assert!(!asked[0].1, "username prompt echoes");
        assert!(asked[1].1, "password prompt is masked");
        assert!(asked[2].1, "token prompt is masked");
    }

    #[test]
    fn test_prompted_token_is_validated() {
        let temp_dir = TempDir::new().unwrap();
        let config = session(&temp_dir, None, Overrides::default());
        let resolver = CredentialResolver::new(&config, ScriptedPrompter::new(&["12345"]));

        let result = resolver.resolve(Some("dave"), Some("pw"), None, Realm::DualFactor);
        assert!(matches!(result, Err(CredentialError::Token(_))));
    }

    #[test]
    fn test_empty_password_becomes_none() {
        let temp_dir = TempDir::new().unwrap();
        let config = session(&temp_dir, None, Overrides::default());
        let resolver = CredentialResolver::new(&config, ScriptedPrompter::new(&[""]));

        let creds = resolver
            .resolve(Some("erin"), None, None, Realm::SingleFactor)
            .unwrap();
        assert_eq!(creds.password, None);
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials {
            username: "frank".to_string(),
            password: Some("topsecret".to_string()),
            token: Token::parse("123456").unwrap(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("frank"));
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("123456"));
    }
}
