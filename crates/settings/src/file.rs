//! TOML config file support.
//!
//! Config location: `~/.config/toolbelt/config.toml`

use crate::constants::{settings as limits, ssh};
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SSH tool settings (`[ssh]` table).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SshConfig {
    /// Port used when the host does not name one.
    pub port: u16,
    /// Upper bound on connect + handshake + authentication.
    pub connect_timeout_ms: u64,
    /// Upper bound on each OS probe command.
    pub probe_timeout_ms: u64,
    /// Sleep between polls of an idle channel.
    pub poll_interval_ms: u64,
    /// Output batching interval.
    pub flush_interval_ms: u64,
    /// Grace period `stop` gives the session worker.
    pub stop_grace_ms: u64,
    /// Output suppression window after a local `clear`.
    pub clear_suppress_ms: u64,
    /// `TERM` requested for the interactive PTY.
    pub terminal_type: String,
    pub terminal_cols: u32,
    pub terminal_rows: u32,
    /// Command that upgrades a Windows session to a richer shell.
    pub windows_shell_command: String,
    /// Screen clear sent after the richer shell starts.
    pub windows_clear_command: String,
    pub windows_shell_settle_ms: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: ssh::DEFAULT_PORT,
            connect_timeout_ms: ssh::DEFAULT_CONNECT_TIMEOUT_MS,
            probe_timeout_ms: ssh::DEFAULT_PROBE_TIMEOUT_MS,
            poll_interval_ms: ssh::DEFAULT_POLL_INTERVAL_MS,
            flush_interval_ms: ssh::DEFAULT_FLUSH_INTERVAL_MS,
            stop_grace_ms: ssh::DEFAULT_STOP_GRACE_MS,
            clear_suppress_ms: ssh::DEFAULT_CLEAR_SUPPRESS_MS,
            terminal_type: ssh::DEFAULT_TERMINAL_TYPE.to_string(),
            terminal_cols: ssh::DEFAULT_TERMINAL_COLS,
            terminal_rows: ssh::DEFAULT_TERMINAL_ROWS,
            windows_shell_command: ssh::DEFAULT_WINDOWS_SHELL_COMMAND.to_string(),
            windows_clear_command: ssh::DEFAULT_WINDOWS_CLEAR_COMMAND.to_string(),
            windows_shell_settle_ms: ssh::DEFAULT_WINDOWS_SHELL_SETTLE_MS,
        }
    }
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn clear_suppress(&self) -> Duration {
        Duration::from_millis(self.clear_suppress_ms)
    }

    pub fn windows_shell_settle(&self) -> Duration {
        Duration::from_millis(self.windows_shell_settle_ms)
    }

    /// Clamp numeric fields into their allowed ranges and reset invalid strings.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        self.connect_timeout_ms = clamp(
            "connect-timeout-ms",
            self.connect_timeout_ms,
            ssh::CONNECT_TIMEOUT_RANGE_MS,
        );
        self.probe_timeout_ms = clamp(
            "probe-timeout-ms",
            self.probe_timeout_ms,
            ssh::PROBE_TIMEOUT_RANGE_MS,
        );
        self.poll_interval_ms = clamp(
            "poll-interval-ms",
            self.poll_interval_ms,
            ssh::POLL_INTERVAL_RANGE_MS,
        );
        self.flush_interval_ms = clamp(
            "flush-interval-ms",
            self.flush_interval_ms,
            ssh::FLUSH_INTERVAL_RANGE_MS,
        );
        self.stop_grace_ms = clamp("stop-grace-ms", self.stop_grace_ms, ssh::STOP_GRACE_RANGE_MS);
        self.clear_suppress_ms = clamp(
            "clear-suppress-ms",
            self.clear_suppress_ms,
            ssh::CLEAR_SUPPRESS_RANGE_MS,
        );
        self.windows_shell_settle_ms = clamp(
            "windows-shell-settle-ms",
            self.windows_shell_settle_ms,
            ssh::WINDOWS_SHELL_SETTLE_RANGE_MS,
        );
        self.terminal_cols = clamp("terminal-cols", self.terminal_cols, ssh::TERMINAL_SIZE_RANGE);
        self.terminal_rows = clamp("terminal-rows", self.terminal_rows, ssh::TERMINAL_SIZE_RANGE);

        if self.port == 0 {
            tracing::warn!("port 0 is not connectable, using {}", defaults.port);
            self.port = defaults.port;
        }
        if !valid_string(&self.terminal_type) {
            tracing::warn!("Invalid terminal-type, using {:?}", defaults.terminal_type);
            self.terminal_type = defaults.terminal_type;
        }
        if !valid_string(&self.windows_shell_command) {
            tracing::warn!("Invalid windows-shell-command, using default");
            self.windows_shell_command = defaults.windows_shell_command;
        }
        if !valid_string(&self.windows_clear_command) {
            tracing::warn!("Invalid windows-clear-command, using default");
            self.windows_clear_command = defaults.windows_clear_command;
        }
        self
    }
}

fn clamp<T: PartialOrd + Copy + std::fmt::Display>(
    key: &str,
    value: T,
    range: RangeInclusive<T>,
) -> T {
    let (min, max) = (*range.start(), *range.end());
    if value < min {
        tracing::warn!("{} = {} is below {}, clamping", key, value, min);
        min
    } else if value > max {
        tracing::warn!("{} = {} is above {}, clamping", key, value, max);
        max
    } else {
        value
    }
}

fn valid_string(value: &str) -> bool {
    !value.trim().is_empty() && value.len() <= limits::MAX_STRING_LENGTH
}

/// User-facing config parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// SSH tool settings.
    pub ssh: SshConfig,
}

/// Default config file content with comments (generated on first launch).
const DEFAULT_CONFIG: &str = r#"# toolbelt configuration
# Every key is optional; remove a line to fall back to the built-in default.

[ssh]
# Port used when none is given on the command line
port = 22

# Give up connecting (TCP + handshake + auth) after this long
connect-timeout-ms = 8000

# Upper bound for each remote OS detection command
probe-timeout-ms = 5000

# How often an idle shell channel is polled for output
poll-interval-ms = 10

# How often buffered output is written to the screen
flush-interval-ms = 50

# How long disconnecting waits for the session to wind down
stop-grace-ms = 1000

# After a local `clear`, ignore remote output for this long
clear-suppress-ms = 100

# Pseudo-terminal requested for the remote shell
terminal-type = "vt100"
terminal-cols = 80
terminal-rows = 24

# Windows hosts: upgrade cmd.exe to a richer shell, then clear the screen
# windows-shell-command = "powershell.exe -NoLogo -NoExit"
# windows-clear-command = "Clear-Host"
# windows-shell-settle-ms = 200
"#;

/// Return the config file path.
pub fn config_path() -> PathBuf {
    toolbelt_paths::config_file()
}

/// Ensure the config file exists, creating a default if missing.
/// Returns the path to the config file.
pub fn ensure_config_file() -> Option<PathBuf> {
    let path = config_path();
    ensure_config_file_at(&path).then_some(path)
}

/// Write the default config template to `path` if nothing is there yet.
pub fn ensure_config_file_at(path: &Path) -> bool {
    if path.exists() {
        return true;
    }
    let Some(parent) = path.parent() else {
        return false;
    };
    if let Err(e) = std::fs::create_dir_all(parent) {
        tracing::warn!("Failed to create config directory {:?}: {}", parent, e);
        return false;
    }
    match std::fs::write(path, DEFAULT_CONFIG) {
        Ok(()) => {
            tracing::info!("Created default config at {:?}", path);
            true
        }
        Err(e) => {
            tracing::warn!("Failed to write default config {:?}: {}", path, e);
            false
        }
    }
}

/// Load and parse the config file. Returns default on any error.
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

/// Load and parse the config file at `path`. Returns default on any error.
pub fn load_config_from(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read config: {}", e);
            }
            return Config::default();
        }
    };

    // Size guard
    if content.len() > limits::MAX_FILE_SIZE as usize {
        tracing::warn!(
            "Config file too large ({} bytes), using defaults",
            content.len()
        );
        return Config::default();
    }

    parse_config(&content)
}

fn parse_config(content: &str) -> Config {
    match toml::from_str::<Config>(content) {
        Ok(cfg) => Config {
            ssh: cfg.ssh.sanitized(),
        },
        Err(e) => {
            tracing::warn!("Failed to parse config: {}", e);
            Config::default()
        }
    }
}
