//! Per-OS shell conventions.

use crate::os_detect::OsKind;
use crate::transport::{SendError, TransportSession};
use settings::SshConfig;
use std::time::Duration;

/// Terminator appended to every submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn for_os(os: OsKind) -> Self {
        match os {
            OsKind::Windows => Self::CrLf,
            OsKind::Linux | OsKind::Unknown => Self::Lf,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }

    /// `command` followed by this line ending.
    pub fn terminate(self, command: &str) -> String {
        let mut line = String::with_capacity(command.len() + 2);
        line.push_str(command);
        line.push_str(self.as_str());
        line
    }
}

/// Commands that move a Windows session from `cmd.exe` into a richer shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellUpgrade {
    pub command: String,
    pub clear_command: String,
    /// Pause between starting the shell and clearing the screen.
    pub settle: Duration,
}

impl ShellUpgrade {
    pub fn from_config(config: &SshConfig) -> Self {
        Self {
            command: config.windows_shell_command.clone(),
            clear_command: config.windows_clear_command.clone(),
            settle: config.windows_shell_settle(),
        }
    }
}

impl Default for ShellUpgrade {
    fn default() -> Self {
        Self::from_config(&SshConfig::default())
    }
}

/// Prepare the shell for `os` and return the line ending to use from now on.
///
/// On Windows the upgrade is sent blind: nothing is awaited or checked, and
/// a failed send leaves the session in the plain shell.
pub fn adapt(session: &TransportSession, os: OsKind, upgrade: &ShellUpgrade) -> LineEnding {
    let line_ending = LineEnding::for_os(os);
    if os == OsKind::Windows {
        match send_upgrade(session, upgrade, line_ending) {
            Ok(()) => tracing::info!("Requested shell upgrade: {}", upgrade.command),
            Err(error) => tracing::debug!("Shell upgrade skipped: {}", error),
        }
    }
    line_ending
}

fn send_upgrade(
    session: &TransportSession,
    upgrade: &ShellUpgrade,
    line_ending: LineEnding,
) -> Result<(), SendError> {
    session.send(line_ending.terminate(&upgrade.command).as_bytes())?;
    std::thread::sleep(upgrade.settle);
    session.send(line_ending.terminate(&upgrade.clear_command).as_bytes())
}
