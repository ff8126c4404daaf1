//! Desktop automation primitives
//!
//! The Pulse Secure client has no API, so it is driven the way a user would:
//! find its windows by title, focus them, press keys, type text. Only the
//! handful of operations the login sequence needs are exposed.

#[cfg(target_os = "linux")]
pub mod linux;

use std::path::Path;
use thiserror::Error;

pub type WindowId = u64;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Required tool '{0}' is not installed")]
    ToolMissing(String),
    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

/// Keys the login sequence presses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Tab,
    Return,
    Down,
}

impl Key {
    /// X keysym name
    pub fn keysym(&self) -> &'static str {
        match self {
            Key::Tab => "Tab",
            Key::Return => "Return",
            Key::Down => "Down",
        }
    }
}

/// Platform-agnostic window and input interface
pub trait Desktop {
    /// Start a program detached from us, returning its PID
    fn launch(&self, program: &Path) -> Result<u32, PlatformError>;
    /// Whether a process with exactly this name is running
    fn is_running(&self, process: &str) -> bool;
    /// Windows whose title is exactly `title`, oldest first
    fn find_windows(&self, title: &str) -> Result<Vec<WindowId>, PlatformError>;
    /// Press keys in `window`, or in whatever has focus when `None`
    fn send_keys(&self, window: Option<WindowId>, keys: &[Key]) -> Result<(), PlatformError>;
    /// Type literal text into `window`
    fn type_text(&self, window: WindowId, text: &str) -> Result<(), PlatformError>;
    /// Close every window titled `title`; if the window tool is unavailable,
    /// terminate `process` instead
    fn close_windows(&self, title: &str, process: &str) -> Result<(), PlatformError>;
}

/// Get the desktop implementation for the current platform
pub fn get_desktop(key_delay_ms: u64) -> Result<Box<dyn Desktop>, PlatformError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::XdotoolDesktop::new(key_delay_ms)))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = key_delay_ms;
        Err(PlatformError::UnsupportedPlatform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::ToolMissing("xdotool".to_string());
        assert_eq!(err.to_string(), "Required tool 'xdotool' is not installed");

        let err = PlatformError::CommandFailed {
            command: "wmctrl -c".to_string(),
            message: "cannot open display".to_string(),
        };
        assert_eq!(err.to_string(), "wmctrl -c failed: cannot open display");

        assert_eq!(
            PlatformError::UnsupportedPlatform.to_string(),
            "Unsupported platform"
        );
    }

    #[test]
    fn test_keysyms() {
        assert_eq!(Key::Tab.keysym(), "Tab");
        assert_eq!(Key::Return.keysym(), "Return");
        assert_eq!(Key::Down.keysym(), "Down");
    }

    #[test]
    fn test_get_desktop_returns_ok() {
        #[cfg(target_os = "linux")]
        {
            assert!(get_desktop(10).is_ok());
        }
    }
}
