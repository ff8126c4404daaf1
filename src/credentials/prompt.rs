//! Interactive terminal prompts

use std::io::{self, BufRead, Write};

/// Source of interactively entered values
pub trait Prompter {
    /// Read one echoed line
    fn prompt_line(&self, label: &str) -> io::Result<String>;
    /// Read one line without echo
    fn prompt_secret(&self, label: &str) -> io::Result<String>;
}

/// Prompts on the controlling terminal; secrets are masked by `rpassword`
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_line(&self, label: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", label)?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn prompt_secret(&self, label: &str) -> io::Result<String> {
        rpassword::prompt_password(label).map(|s| s.trim_end_matches(['\r', '\n']).to_string())
    }
}
