//! `.netrc` credential store
//!
//! Only the subset needed here: `machine`, `default`, `login`, `password`.
//! `macdef` bodies are skipped up to the next blank line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum NetrcError {
    #[error("Failed to read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("Failed to restrict permissions on {path}: {source}")]
    PermissionError { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetrcEntry {
    pub login: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Netrc {
    machines: Vec<(String, NetrcEntry)>,
    default: Option<NetrcEntry>,
}

impl Netrc {
    /// Read and parse the store. A missing file is an empty store.
    ///
    /// Group/other permissions are stripped before the file is read.
    pub fn load(path: &Path) -> Result<Self, NetrcError> {
        if !path.exists() {
            debug!("No credentials store at {}", path.display());
            return Ok(Self::default());
        }

        restrict_permissions(path)?;

        let content = fs::read_to_string(path).map_err(|source| NetrcError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut netrc = Netrc::default();
        let mut current: Option<(Option<String>, NetrcEntry)> = None;
        let mut tokens = Tokens::new(content);

        while let Some(token) = tokens.next_token() {
            match token {
                "machine" | "default" => {
                    if let Some(done) = current.take() {
                        netrc.push(done);
                    }
                    let host = if token == "machine" {
                        tokens.next_token().map(str::to_string)
                    } else {
                        None
                    };
                    current = Some((host, NetrcEntry::default()));
                }
                "login" => {
                    let value = tokens.next_token().map(str::to_string);
                    if let Some((_, entry)) = current.as_mut() {
                        entry.login = value;
                    }
                }
                "password" => {
                    let value = tokens.next_token().map(str::to_string);
                    if let Some((_, entry)) = current.as_mut() {
                        entry.password = value;
                    }
                }
                "account" => {
                    tokens.next_token();
                }
                "macdef" => {
                    tokens.next_token();
                    tokens.skip_macro();
                }
                other => debug!("Ignoring netrc token '{}'", other),
            }
        }

        if let Some(done) = current.take() {
            netrc.push(done);
        }
        netrc
    }

    fn push(&mut self, (host, entry): (Option<String>, NetrcEntry)) {
        match host {
            Some(host) => self.machines.push((host, entry)),
            None => self.default = Some(entry),
        }
    }

    /// Entry for `host`, falling back to the entry for `fallback_host`,
    /// then the `default` block
    pub fn lookup(&self, host: &str, fallback_host: &str) -> Option<&NetrcEntry> {
        self.machine(host)
            .or_else(|| self.machine(fallback_host))
            .or(self.default.as_ref())
    }

    fn machine(&self, host: &str) -> Option<&NetrcEntry> {
        self.machines
            .iter()
            .find(|(name, _)| name == host)
            .map(|(_, entry)| entry)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), NetrcError> {
    use std::os::unix::fs::PermissionsExt;

    let to_err = |source| NetrcError::PermissionError {
        path: path.to_path_buf(),
        source,
    };

    let mode = fs::metadata(path).map_err(to_err)?.permissions().mode();
    if mode & 0o077 != 0 {
        warn!(
            "{} is accessible by other users (mode {:o}), restricting to 600",
            path.display(),
            mode & 0o777
        );
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(to_err)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), NetrcError> {
    Ok(())
}

/// Whitespace tokenizer that can skip `macdef` bodies
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(content: &'a str) -> Self {
        Self { rest: content }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let (token, rest) = trimmed.split_at(end);
        self.rest = rest;
        Some(token)
    }

    fn skip_macro(&mut self) {
        self.rest = match self.rest.find("\n\n") {
            Some(end) => &self.rest[end + 2..],
            None => "",
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
machine vpn.example.org
  login alice
  password s3cret

machine other.example.org login bob password hunter2
default login guest password guest
";

    #[test]
    fn test_parse_machines_and_default() {
        let netrc = Netrc::parse(SAMPLE);

        let entry = netrc.lookup("vpn.example.org", "none").unwrap();
        assert_eq!(entry.login.as_deref(), Some("alice"));
        assert_eq!(entry.password.as_deref(), Some("s3cret"));

        let entry = netrc.lookup("other.example.org", "none").unwrap();
        assert_eq!(entry.login.as_deref(), Some("bob"));

        let entry = netrc.lookup("unknown.example.org", "none").unwrap();
        assert_eq!(entry.login.as_deref(), Some("guest"));
    }

    #[test]
    fn test_lookup_falls_back_to_default_host() {
        let netrc = Netrc::parse("machine vpn.example.org login alice password pw\n");
        let entry = netrc.lookup("alias.example.org", "vpn.example.org").unwrap();
        assert_eq!(entry.login.as_deref(), Some("alice"));
        assert!(netrc.lookup("a", "b").is_none());
    }

    #[test]
    fn test_macdef_is_skipped() {
        let netrc = Netrc::parse(
            "macdef init\nlogin mallory\npassword nope\n\nmachine vpn.example.org login alice\n",
        );
        let entry = netrc.lookup("vpn.example.org", "none").unwrap();
        assert_eq!(entry.login.as_deref(), Some("alice"));
        assert_eq!(entry.password, None);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let netrc = Netrc::load(&temp_dir.path().join(".netrc")).unwrap();
        assert!(netrc.lookup("vpn.example.org", "vpn.example.org").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_load_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".netrc");
        fs::write(&path, SAMPLE).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let netrc = Netrc::load(&path).unwrap();
        assert!(netrc.lookup("vpn.example.org", "none").is_some());

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_load_leaves_private_file_alone() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".netrc");
        fs::write(&path, SAMPLE).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o400)).unwrap();

        Netrc::load(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
    }
}
