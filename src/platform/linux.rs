//! X11 desktop automation through xdotool and wmctrl

use super::{Desktop, Key, PlatformError, WindowId};
use crate::process::find_process_by_name;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::{debug, warn};

pub struct XdotoolDesktop {
    key_delay_ms: u64,
}

impl XdotoolDesktop {
    pub fn new(key_delay_ms: u64) -> Self {
        Self { key_delay_ms }
    }

    fn xdotool(&self, args: &[&str]) -> Result<Output, PlatformError> {
        run("xdotool", args)
    }

    fn activate(&self, window: WindowId) -> Result<(), PlatformError> {
        let id = window.to_string();
        let output = self.xdotool(&["windowactivate", "--sync", &id])?;
        check("xdotool windowactivate", &output)
    }
}

impl Default for XdotoolDesktop {
    fn default() -> Self {
        Self::new(12)
    }
}

fn run(tool: &str, args: &[&str]) -> Result<Output, PlatformError> {
    Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(tool, e))
}

fn spawn_error(tool: &str, e: io::Error) -> PlatformError {
    if e.kind() == io::ErrorKind::NotFound {
        PlatformError::ToolMissing(tool.to_string())
    } else {
        PlatformError::CommandFailed {
            command: tool.to_string(),
            message: e.to_string(),
        }
    }
}

fn check(command: &str, output: &Output) -> Result<(), PlatformError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(PlatformError::CommandFailed {
            command: command.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl Desktop for XdotoolDesktop {
    fn launch(&self, program: &Path) -> Result<u32, PlatformError> {
        let child = Command::new(program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&program.display().to_string(), e))?;
        debug!("Launched {} (PID {})", program.display(), child.id());
        Ok(child.id())
    }

    fn is_running(&self, process: &str) -> bool {
        find_process_by_name(process).is_some()
    }

    fn find_windows(&self, title: &str) -> Result<Vec<WindowId>, PlatformError> {
        let pattern = format!("^{}$", title);
        let output = self.xdotool(&["search", "--name", &pattern])?;
        // xdotool exits 1 when nothing matches
        let windows: Vec<WindowId> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect();
        debug!("Windows titled '{}': {:?}", title, windows);
        Ok(windows)
    }

    fn send_keys(&self, window: Option<WindowId>, keys: &[Key]) -> Result<(), PlatformError> {
        if let Some(window) = window {
            self.activate(window)?;
        }
        let delay = self.key_delay_ms.to_string();
        let mut args = vec!["key", "--clearmodifiers", "--delay", delay.as_str()];
        for key in keys {
            args.push(key.keysym());
        }
        let output = self.xdotool(&args)?;
        check("xdotool key", &output)
    }

    fn type_text(&self, window: WindowId, text: &str) -> Result<(), PlatformError> {
        self.activate(window)?;

        // Text goes through stdin so it never shows up in the process list
        let delay = self.key_delay_ms.to_string();
        let mut child = Command::new("xdotool")
            .args(["type", "--clearmodifiers", "--delay", &delay, "--file", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error("xdotool", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| spawn_error("xdotool", e))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| spawn_error("xdotool", e))?;
        check("xdotool type", &output)
    }

    fn close_windows(&self, title: &str, process: &str) -> Result<(), PlatformError> {
        let windows = match self.find_windows(title) {
            Ok(windows) => windows,
            Err(PlatformError::ToolMissing(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut closed_all = true;
        for window in &windows {
            let hex = format!("0x{:08x}", window);
            match run("wmctrl", &["-i", "-c", &hex]) {
                Ok(output) => {
                    if let Err(e) = check("wmctrl -c", &output) {
                        warn!("{}", e);
                        closed_all = false;
                    }
                }
                Err(PlatformError::ToolMissing(_)) => {
                    warn!("wmctrl is not installed, terminating {} instead", process);
                    closed_all = false;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if (windows.is_empty() || !closed_all) && find_process_by_name(process).is_some() {
            let output = run("pkill", &["-x", process])?;
            check("pkill", &output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_desktop_creation() {
        let desktop = XdotoolDesktop::new(5);
        let _default = XdotoolDesktop::default();
        assert_eq!(desktop.key_delay_ms, 5);
    }

    #[test]
    fn test_spawn_error_maps_missing_tool() {
        let err = spawn_error("xdotool", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, PlatformError::ToolMissing(ref t) if t == "xdotool"));

        let err = spawn_error("wmctrl", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, PlatformError::CommandFailed { .. }));
    }

    #[test]
    fn test_missing_program_is_reported() {
        let desktop = XdotoolDesktop::default();
        let result = desktop.launch(Path::new("/nonexistent/pulseUi"));
        assert!(matches!(result, Err(PlatformError::ToolMissing(_))));
    }
}
