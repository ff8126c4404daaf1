//! Connection profiles known to the Pulse Secure client
//!
//! The client keeps one JSON object per line:
//!
//! ```text
//! {"connName": "vpn.example.org", "preferredCert": "", "baseUrl": "https://vpn.example.org"}
//! ```
//!
//! The GUI lists connections in file order, so the line index of a profile
//! is also its position in the window.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read connection store {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("Failed to write connection store {path}: {source}")]
    WriteError { path: PathBuf, source: io::Error },
    #[error("Failed to encode profile: {0}")]
    EncodeError(#[from] serde_json::Error),
    #[error(
        "Pulse Secure configuration directory {0} does not exist; start the client once so it can create it"
    )]
    MissingStoreDir(PathBuf),
    #[error("{count} connection profiles point at {url}; remove the duplicates in the Pulse Secure client")]
    Duplicate { url: String, count: usize },
    #[error("Connection profile for {0} still missing after adding it")]
    NotCreated(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "connName")]
    pub name: String,
    #[serde(rename = "preferredCert", default)]
    pub preferred_cert: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
}

impl Profile {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preferred_cert: String::new(),
            base_url: base_url.into(),
        }
    }
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Profiles in GUI order. Lines that are not profiles are skipped.
    pub fn list(&self) -> Result<Vec<Profile>, ProfileError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ProfileError::ReadError {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let profiles = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Profile>(line) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!("Skipping unreadable connection entry: {}", e);
                    None
                }
            })
            .collect();
        Ok(profiles)
    }

    /// Position of the profile for `url`, if there is exactly one
    pub fn locate(&self, url: &str) -> Result<Option<usize>, ProfileError> {
        let matches: Vec<usize> = self
            .list()?
            .iter()
            .enumerate()
            .filter(|(_, p)| same_url(&p.base_url, url))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [index] => Ok(Some(*index)),
            _ => Err(ProfileError::Duplicate {
                url: url.to_string(),
                count: matches.len(),
            }),
        }
    }

    pub fn append(&self, profile: &Profile) -> Result<(), ProfileError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                return Err(ProfileError::MissingStoreDir(dir.to_path_buf()));
            }
        }

        let write_error = |source| ProfileError::WriteError {
            path: self.path.clone(),
            source,
        };

        // Keep the new record on its own line even if the last one is unterminated
        let needs_newline = fs::read(&self.path)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_error)?;
        let mut line = serde_json::to_string(profile)?;
        if needs_newline {
            line.insert(0, '\n');
        }
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(write_error)?;
        debug!("Appended profile {:?} to {}", profile, self.path.display());
        Ok(())
    }

    /// Index of the profile for `url`, adding one named `name` if missing
    pub fn ensure(&self, url: &str, name: &str) -> Result<usize, ProfileError> {
        if let Some(index) = self.locate(url)? {
            return Ok(index);
        }

        info!("Adding connection profile for {}", url);
        self.append(&Profile::new(name, url))?;
        self.locate(url)?
            .ok_or_else(|| ProfileError::NotCreated(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://vpn.example.org";

    fn store_with(temp_dir: &TempDir, content: &str) -> ProfileStore {
        let path = temp_dir.path().join(".pulse_Connections.txt");
        fs::write(&path, content).unwrap();
        ProfileStore::new(path)
    }

    #[test]
    fn test_locate_counts_profiles_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(
            &temp_dir,
            concat!(
                r#"{"connName": "lab", "preferredCert": "", "baseUrl": "https://lab.example.net"}"#,
                "\n\n",
                r#"{"connName": "work", "preferredCert": "", "baseUrl": "https://vpn.example.org/"}"#,
                "\n",
            ),
        );

        assert_eq!(store.locate(URL).unwrap(), Some(1));
        assert_eq!(store.locate("https://other.example.com").unwrap(), None);
    }

    #[test]
    fn test_locate_missing_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path().join("absent.txt"));
        assert_eq!(store.locate(URL).unwrap(), None);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_are_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let line = r#"{"connName": "a", "preferredCert": "", "baseUrl": "https://vpn.example.org"}"#;
        let store = store_with(&temp_dir, &format!("{}\n{}\n", line, line));

        match store.locate(URL) {
            Err(ProfileError::Duplicate { count, .. }) => assert_eq!(count, 2),
            other => panic!("expected duplicate error, got {:?}", other),
        }
        assert!(store.ensure(URL, "vpn.example.org").is_err());
    }

    #[test]
    fn test_ensure_appends_missing_profile() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(
            &temp_dir,
            r#"{"connName": "lab", "preferredCert": "", "baseUrl": "https://lab.example.net"}"#,
        );

        assert_eq!(store.ensure(URL, "vpn.example.org").unwrap(), 1);
        assert_eq!(store.ensure(URL, "vpn.example.org").unwrap(), 1);

        let profiles = store.list().unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[1], Profile::new("vpn.example.org", URL));

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains(r#""connName":"vpn.example.org""#));
        assert!(content.contains(r#""preferredCert":"""#));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_append_requires_store_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path().join("pulse").join(".pulse_Connections.txt"));

        assert!(matches!(
            store.ensure(URL, "vpn.example.org"),
            Err(ProfileError::MissingStoreDir(_))
        ));
    }

    #[test]
    fn test_garbled_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(
            &temp_dir,
            "not json\n{\"connName\": \"work\", \"baseUrl\": \"https://vpn.example.org\"}\n",
        );

        assert_eq!(store.locate(URL).unwrap(), Some(0));
    }
}
