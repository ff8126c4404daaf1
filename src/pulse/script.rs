//! Scripted login sequence for the Pulse Secure window
//!
//! The login is data: [`LoginScript::build`] produces an ordered list of
//! [`Step`]s and [`ScriptRunner`] interprets them against a [`Desktop`].
//! Every tab count and title below encodes the client's screen layout; the
//! UI cannot be inspected, so these values are the contract.
//!
//! Any window lookup that finds nothing aborts the script. The only loop is
//! the wait for the final popup to close, which signals a successful login.

use crate::credentials::Credentials;
use crate::platform::{Desktop, Key, PlatformError, WindowId};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Title shared by the main window and its login popups
pub const WINDOW_TITLE: &str = "Pulse Secure";

/// Tabs from the window's initial focus to the first connection entry
pub const PROFILE_TAB_OFFSET: usize = 3;

/// Tabs from the notification popup's focus to its dismiss button
pub const NOTIFICATION_TABS: usize = 2;

pub const LAUNCH_SETTLE: Duration = Duration::from_secs(3);
pub const STEP_PAUSE: Duration = Duration::from_secs(1);
pub const POPUP_SETTLE: Duration = Duration::from_secs(2);
pub const POPUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Pulse Secure {0} window not found; the client is not in the expected state")]
    WindowNotFound(WindowSlot),
    #[error("Script used the {0} window before locating it")]
    UnboundWindow(WindowSlot),
    #[error("Pulse Secure {slot} window still open after {secs}s")]
    PopupTimeout { slot: WindowSlot, secs: u64 },
    #[error("{0}")]
    Platform(#[from] PlatformError),
}

/// Windows the script refers to by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowSlot {
    Main,
    Credentials,
    Token,
}

impl fmt::Display for WindowSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowSlot::Main => "main",
            WindowSlot::Credentials => "login",
            WindowSlot::Token => "token",
        };
        f.write_str(name)
    }
}

/// Text typed from the credentials at run time, so scripts can be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Password,
    Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Start the GUI program
    Launch,
    Pause(Duration),
    /// Bind the only window titled [`WINDOW_TITLE`] to `Main`
    LocateMain,
    /// Bind the newest titled window not already bound
    LocatePopup(WindowSlot),
    /// Press keys in a bound window, or the focused one when `None`
    Keys(Option<WindowSlot>, Vec<Key>),
    Type(WindowSlot, Field),
    /// Poll until the bound window disappears
    WaitClosed(WindowSlot),
}

#[derive(Debug, Clone, Copy)]
pub struct ScriptOptions {
    pub dual_factor: bool,
    pub skip_notification: bool,
    pub speed: f64,
}

#[derive(Debug, Clone)]
pub struct LoginScript {
    steps: Vec<Step>,
}

fn tabs(count: usize) -> impl Iterator<Item = Key> {
    std::iter::repeat_n(Key::Tab, count)
}

impl LoginScript {
    /// Login sequence for the connection at `profile_index` in the client's list
    pub fn build(profile_index: usize, options: &ScriptOptions) -> Self {
        let pause = |base: Duration| Step::Pause(base.mul_f64(options.speed));
        let mut steps = vec![Step::Launch, pause(LAUNCH_SETTLE), Step::LocateMain];

        // 1. Select the connection and press Connect
        let select = tabs(profile_index + PROFILE_TAB_OFFSET)
            .chain([Key::Return])
            .collect();
        steps.push(Step::Keys(Some(WindowSlot::Main), select));
        steps.push(pause(STEP_PAUSE));

        // 2. One-time notification popup
        if !options.skip_notification {
            let dismiss = tabs(NOTIFICATION_TABS).chain([Key::Return]).collect();
            steps.push(Step::Keys(None, dismiss));
            steps.push(pause(STEP_PAUSE));
        }

        // 3. Login form
        let login = WindowSlot::Credentials;
        steps.push(pause(POPUP_SETTLE));
        steps.push(Step::LocatePopup(login));
        steps.push(Step::Type(login, Field::Username));
        steps.push(Step::Keys(Some(login), vec![Key::Tab]));
        steps.push(Step::Type(login, Field::Password));
        steps.push(Step::Keys(Some(login), vec![Key::Tab]));
        if options.dual_factor {
            steps.push(Step::Keys(Some(login), vec![Key::Down]));
        }
        steps.push(Step::Keys(Some(login), vec![Key::Tab, Key::Return]));

        // 4. Token popup, or the login popup closing
        if options.dual_factor {
            let token = WindowSlot::Token;
            steps.push(pause(POPUP_SETTLE));
            steps.push(Step::LocatePopup(token));
            steps.push(Step::Type(token, Field::Token));
            steps.push(Step::Keys(Some(token), vec![Key::Return]));
            steps.push(Step::WaitClosed(token));
        } else {
            steps.push(Step::WaitClosed(login));
        }

        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Interprets a [`LoginScript`] against a desktop
pub struct ScriptRunner<'a, D: Desktop + ?Sized> {
    desktop: &'a D,
    program: &'a Path,
    poll_interval: Duration,
    popup_timeout: Option<Duration>,
    windows: HashMap<WindowSlot, WindowId>,
}

impl<'a, D: Desktop + ?Sized> ScriptRunner<'a, D> {
    pub fn new(desktop: &'a D, program: &'a Path, popup_timeout: Option<Duration>) -> Self {
        Self {
            desktop,
            program,
            poll_interval: POPUP_POLL_INTERVAL,
            popup_timeout,
            windows: HashMap::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn window(&self, slot: WindowSlot) -> Option<WindowId> {
        self.windows.get(&slot).copied()
    }

    fn bound(&self, slot: WindowSlot) -> Result<WindowId, ScriptError> {
        self.window(slot).ok_or(ScriptError::UnboundWindow(slot))
    }

    pub async fn run(
        &mut self,
        script: &LoginScript,
        credentials: &Credentials,
    ) -> Result<(), ScriptError> {
        for (n, step) in script.steps().iter().enumerate() {
            debug!("Automation step {}: {:?}", n + 1, step);
            self.execute(step, credentials).await?;
        }
        Ok(())
    }

    async fn execute(&mut self, step: &Step, credentials: &Credentials) -> Result<(), ScriptError> {
        match step {
            Step::Launch => {
                let pid = self.desktop.launch(self.program)?;
                info!("Started {} (PID {})", self.program.display(), pid);
            }
            Step::Pause(duration) => tokio::time::sleep(*duration).await,
            Step::LocateMain => {
                let window = self
                    .desktop
                    .find_windows(WINDOW_TITLE)?
                    .first()
                    .copied()
                    .ok_or(ScriptError::WindowNotFound(WindowSlot::Main))?;
                self.windows.insert(WindowSlot::Main, window);
            }
            Step::LocatePopup(slot) => {
                let known: Vec<WindowId> = self.windows.values().copied().collect();
                let window = self
                    .desktop
                    .find_windows(WINDOW_TITLE)?
                    .into_iter()
                    .filter(|w| !known.contains(w))
                    .last()
                    .ok_or(ScriptError::WindowNotFound(*slot))?;
                debug!("{} popup is window {}", slot, window);
                self.windows.insert(*slot, window);
            }
            Step::Keys(target, keys) => {
                let window = target.map(|slot| self.bound(slot)).transpose()?;
                self.desktop.send_keys(window, keys)?;
            }
            Step::Type(slot, field) => {
                let window = self.bound(*slot)?;
                let text = match field {
                    Field::Username => credentials.username.as_str(),
                    Field::Password => credentials.password.as_deref().unwrap_or(""),
                    Field::Token => credentials.token.value(),
                };
                self.desktop.type_text(window, text)?;
            }
            Step::WaitClosed(slot) => self.wait_closed(*slot).await?,
        }
        Ok(())
    }

    async fn wait_closed(&self, slot: WindowSlot) -> Result<(), ScriptError> {
        let window = self.bound(slot)?;
        let started = Instant::now();
        info!("Waiting for the {} window to close", slot);

        while self.desktop.find_windows(WINDOW_TITLE)?.contains(&window) {
            if let Some(limit) = self.popup_timeout {
                if started.elapsed() >= limit {
                    return Err(ScriptError::PopupTimeout {
                        slot,
                        secs: limit.as_secs(),
                    });
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        debug!("{} window closed after {:?}", slot, started.elapsed());
        Ok(())
    }
}
