//! Terminal input/output for the interactive manager

use std::io::{self, BufRead, Stdin, StdinLock, Stdout, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::utils::{ManagerError, Result};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Line-oriented prompt reader plus the writer everything is printed to
pub struct Console<R, W> {
    input: R,
    output: W,
    interactive: bool,
    show_progress: bool,
}

impl Console<StdinLock<'static>, Stdout> {
    /// Console on the process terminal
    pub fn stdio(quiet: bool) -> Self {
        let stdin: Stdin = io::stdin();
        Self {
            input: stdin.lock(),
            output: io::stdout(),
            interactive: true,
            show_progress: !quiet,
        }
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    /// Non-interactive console: no screen clearing, no spinners
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            interactive: false,
            show_progress: false,
        }
    }

    pub fn out(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Print `prompt` and read one line without its line ending
    ///
    /// End of input is reported as [`ManagerError::EndOfInput`].
    pub fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Err(ManagerError::EndOfInput);
        }

        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        Ok(line)
    }

    pub fn ask_trimmed(&mut self, prompt: &str) -> Result<String> {
        Ok(self.ask(prompt)?.trim().to_string())
    }

    /// Wait for Enter
    pub fn pause(&mut self, prompt: &str) -> Result<()> {
        self.ask(prompt).map(|_| ())
    }

    pub fn clear_screen(&mut self) -> io::Result<()> {
        if self.interactive {
            write!(self.output, "{}", CLEAR_SCREEN)?;
            self.output.flush()?;
        }
        Ok(())
    }

    /// Spinner on stderr, hidden when progress output is off
    pub fn spinner(&self, message: String) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    pub fn success(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "✔ {}", message)
    }

    pub fn warn(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "⚠ {}", message)
    }

    pub fn failure(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "✖ {}", message)
    }
}
