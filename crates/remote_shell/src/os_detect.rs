//! Remote operating system detection.
//!
//! Runs one-shot probes on the connection before the shell is used, so the
//! caller never has to know what it is connecting to.

use crate::transport::{ProbeError, TransportSession};
use std::fmt;
use std::time::Duration;

/// Unix identification probe. Any output at all means a Unix-like host.
pub const UNIX_PROBE: &str = "uname -a";
/// Windows version probe (a `cmd.exe` builtin).
pub const WINDOWS_PROBE: &str = "ver";
/// Substring of the Windows probe output that identifies Windows.
pub const WINDOWS_MARKER: &str = "Windows";

/// Operating system family of the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OsKind {
    #[default]
    Unknown,
    Linux,
    Windows,
}

impl OsKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Linux => "Linux",
            Self::Windows => "Windows",
        }
    }
}

impl fmt::Display for OsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify the host behind `session`. Never fails; unanswerable means Unknown.
pub fn detect(session: &TransportSession, timeout: Duration) -> OsKind {
    classify(|command| session.exec(command, timeout))
}

/// Probe with `run` and classify from the answers.
///
/// The Unix probe wins outright; the Windows probe only runs when it came back
/// empty. A probe that fails to execute counts as empty output.
pub fn classify<F>(mut run: F) -> OsKind
where
    F: FnMut(&str) -> Result<String, ProbeError>,
{
    if !probe(&mut run, UNIX_PROBE).trim().is_empty() {
        return OsKind::Linux;
    }
    if probe(&mut run, WINDOWS_PROBE).contains(WINDOWS_MARKER) {
        return OsKind::Windows;
    }
    OsKind::Unknown
}

fn probe<F>(run: &mut F, command: &str) -> String
where
    F: FnMut(&str) -> Result<String, ProbeError>,
{
    match run(command) {
        Ok(output) => output,
        Err(error) => {
            tracing::debug!("{}", error);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    fn answers<'a>(
        unix: Option<&'a str>,
        windows: Option<&'a str>,
        ran: &'a mut Vec<String>,
    ) -> impl FnMut(&str) -> Result<String, ProbeError> + 'a {
        move |command| {
            ran.push(command.to_string());
            let reply = if command == UNIX_PROBE { unix } else { windows };
            reply
                .map(str::to_string)
                .ok_or_else(|| ProbeError::new(command, "not found"))
        }
    }

    #[test_case(Some("Linux box 6.1.0 x86_64 GNU/Linux"), None, OsKind::Linux ; "linux kernel string")]
    #[test_case(Some("Darwin mac 23.1.0"), None, OsKind::Linux ; "any unix answer")]
    #[test_case(Some(""), Some("Microsoft Windows [Version 10.0.19045]"), OsKind::Windows ; "windows banner")]
    #[test_case(None, Some("Microsoft Windows [Version 10.0.19045]"), OsKind::Windows ; "failed unix probe")]
    #[test_case(Some(""), Some("VMS V8.4"), OsKind::Unknown ; "no marker")]
    #[test_case(Some("  \r\n"), Some(""), OsKind::Unknown ; "whitespace only")]
    #[test_case(None, None, OsKind::Unknown ; "both probes fail")]
    fn classifies(unix: Option<&str>, windows: Option<&str>, expected: OsKind) {
        let mut ran = Vec::new();
        assert_eq!(classify(answers(unix, windows, &mut ran)), expected);
    }

    #[test]
    fn linux_probe_short_circuits() {
        let mut ran = Vec::new();
        classify(answers(Some("Linux"), Some("Windows"), &mut ran));
        assert_eq!(ran, vec![UNIX_PROBE.to_string()]);
    }

    #[test]
    fn labels_match_display() {
        for os in [OsKind::Unknown, OsKind::Linux, OsKind::Windows] {
            assert_eq!(os.to_string(), os.label());
        }
    }

    proptest! {
        #[test]
        fn nonblank_unix_answer_is_always_linux(unix in ".*[^\\s].*", windows in ".*") {
            let mut ran = Vec::new();
            prop_assert_eq!(
                classify(answers(Some(unix.as_str()), Some(windows.as_str()), &mut ran)),
                OsKind::Linux
            );
        }
    }
}
