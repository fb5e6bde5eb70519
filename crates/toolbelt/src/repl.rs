//! Line-oriented front end for a remote shell session.
//!
//! Every stdin line is a command for the remote shell, except the
//! colon-prefixed local commands below. An empty line submits the entry last
//! recalled with `:prev`/`:next`.

use anyhow::{Context, Result};
use remote_shell::SessionController;
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// How often the loop checks whether the session ended on its own.
const SESSION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    History,
    Previous,
    Next,
    /// Submit the recalled entry.
    Recalled,
    Command(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            ":quit" | ":q" => Self::Quit,
            ":history" => Self::History,
            ":prev" => Self::Previous,
            ":next" => Self::Next,
            "" => Self::Recalled,
            _ => Self::Command(line.to_string()),
        }
    }
}

/// Feeds input to the controller and tracks the recalled entry.
pub struct Repl<'a, W> {
    controller: &'a SessionController,
    status: W,
    recalled: String,
}

impl<'a, W: Write> Repl<'a, W> {
    pub fn new(controller: &'a SessionController, status: W) -> Self {
        Self {
            controller,
            status,
            recalled: String::new(),
        }
    }

    /// Handle one line. Returns `false` when the user asked to quit.
    pub fn handle(&mut self, input: Input) -> Result<bool> {
        match input {
            Input::Quit => return Ok(false),
            Input::History => {
                for (index, entry) in self.controller.history().iter().enumerate() {
                    writeln!(self.status, "{:>4}  {}", index + 1, entry)?;
                }
            }
            Input::Previous => {
                if let Some(entry) = self.controller.recall_previous(&self.recalled) {
                    self.recalled = entry;
                }
                self.show_recalled()?;
            }
            Input::Next => {
                self.recalled = self.controller.recall_next();
                self.show_recalled()?;
            }
            Input::Recalled => {
                let command = std::mem::take(&mut self.recalled);
                self.controller.submit(&command);
            }
            Input::Command(command) => {
                self.recalled.clear();
                self.controller.submit(&command);
            }
        }
        Ok(true)
    }

    fn show_recalled(&mut self) -> Result<()> {
        writeln!(self.status, "> {}", self.recalled)?;
        Ok(())
    }
}

/// Run until EOF, `:quit`, or the session ending.
pub fn run(controller: &SessionController, status: impl Write) -> Result<()> {
    let lines = spawn_stdin_reader()?;
    let mut repl = Repl::new(controller, status);

    loop {
        match lines.recv_timeout(SESSION_POLL_INTERVAL) {
            Ok(line) => {
                if !repl.handle(Input::parse(&line))? {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if controller.state().is_finished() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

/// Read stdin on its own thread so a remote hang-up is noticed without input.
fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("toolbelt-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to spawn stdin reader")?;
    Ok(rx)
}
