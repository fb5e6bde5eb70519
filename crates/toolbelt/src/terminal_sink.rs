//! Display sink backed by the process's own terminal.

use parking_lot::Mutex;
use remote_shell::{ConnectError, DisplaySink, OsKind};
use std::io::{self, Write};
use util::ResultExt;

/// Erase the screen and home the cursor.
const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

/// Writes remote output to `out` and status lines to `status`.
///
/// Remote output and log lines never interleave when `out` is stdout, since
/// logging goes to stderr.
pub struct TerminalSink<O, S> {
    out: Mutex<O>,
    status: Mutex<S>,
}

impl TerminalSink<io::Stdout, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, S: Write> TerminalSink<O, S> {
    pub fn new(out: O, status: S) -> Self {
        Self {
            out: Mutex::new(out),
            status: Mutex::new(status),
        }
    }

    fn write_out(&self, bytes: &[u8]) {
        let mut out = self.out.lock();
        out.write_all(bytes)
            .and_then(|()| out.flush())
            .log_debug("writing remote output");
    }

    fn status_line(&self, line: std::fmt::Arguments<'_>) {
        writeln!(self.status.lock(), "[toolbelt] {}", line).log_debug("writing status line");
    }

    #[cfg(test)]
    fn into_parts(self) -> (O, S) {
        (self.out.into_inner(), self.status.into_inner())
    }
}

impl<O, S> DisplaySink for TerminalSink<O, S>
where
    O: Write + Send,
    S: Write + Send,
{
    fn append(&self, text: &str) {
        self.write_out(text.as_bytes());
    }

    fn clear(&self) {
        self.write_out(CLEAR_SCREEN);
    }

    fn connected(&self, address: &str) {
        self.status_line(format_args!("connected to {}", address));
    }

    fn connection_failed(&self, error: &ConnectError) {
        self.status_line(format_args!("connection failed: {}", error));
    }

    fn os_detected(&self, os: OsKind) {
        self.status_line(format_args!("remote OS: {}", os));
    }

    fn disconnected(&self) {
        self.status_line(format_args!("disconnected"));
    }
}
