//! Centralized configuration constants for toolbelt.
//!
//! Defaults and allowed ranges for every tunable, organized by component.

/// SSH tool configuration.
pub mod ssh {
    use std::ops::RangeInclusive;

    /// Default SSH port.
    pub const DEFAULT_PORT: u16 = 22;

    /// Upper bound on establishing an authenticated connection.
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 8_000;
    pub const CONNECT_TIMEOUT_RANGE_MS: RangeInclusive<u64> = 500..=120_000;

    /// Upper bound on each one-shot OS probe command.
    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
    pub const PROBE_TIMEOUT_RANGE_MS: RangeInclusive<u64> = 100..=60_000;

    /// Sleep between channel polls when no output is pending.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
    pub const POLL_INTERVAL_RANGE_MS: RangeInclusive<u64> = 1..=1_000;

    /// Interval between output batch flushes to the display.
    pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 50;
    pub const FLUSH_INTERVAL_RANGE_MS: RangeInclusive<u64> = 10..=1_000;

    /// How long `stop` waits for the session worker before detaching it.
    pub const DEFAULT_STOP_GRACE_MS: u64 = 1_000;
    pub const STOP_GRACE_RANGE_MS: RangeInclusive<u64> = 0..=10_000;

    /// Output suppression window after a local `clear`.
    pub const DEFAULT_CLEAR_SUPPRESS_MS: u64 = 100;
    pub const CLEAR_SUPPRESS_RANGE_MS: RangeInclusive<u64> = 0..=2_000;

    /// PTY requested for the interactive shell.
    pub const DEFAULT_TERMINAL_TYPE: &str = "vt100";
    pub const DEFAULT_TERMINAL_COLS: u32 = 80;
    pub const DEFAULT_TERMINAL_ROWS: u32 = 24;
    pub const TERMINAL_SIZE_RANGE: RangeInclusive<u32> = 1..=1_000;

    /// Richer shell started on Windows hosts.
    pub const DEFAULT_WINDOWS_SHELL_COMMAND: &str = "powershell.exe -NoLogo -NoExit";
    /// Screen clear issued once the richer shell is up.
    pub const DEFAULT_WINDOWS_CLEAR_COMMAND: &str = "Clear-Host";
    /// Pause between starting the richer shell and clearing the screen.
    pub const DEFAULT_WINDOWS_SHELL_SETTLE_MS: u64 = 200;
    pub const WINDOWS_SHELL_SETTLE_RANGE_MS: RangeInclusive<u64> = 0..=5_000;
}

/// Settings file validation limits.
pub mod settings {
    /// Maximum settings file size in bytes (64 KB).
    /// Settings files should be tiny; anything larger is suspicious.
    pub const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Maximum length for string fields (shell commands, terminal type).
    pub const MAX_STRING_LENGTH: usize = 256;
}
