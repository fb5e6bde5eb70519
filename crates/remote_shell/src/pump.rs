//! Shell output pump.
//!
//! Drains the shell channel on the session worker thread and hands decoded
//! text to a consumer. Reads never block: an idle channel is re-polled after a
//! short sleep, so a cleared `running` flag is seen within one poll interval.

use crate::transport::{Recv, TransportSession};
use std::char::REPLACEMENT_CHARACTER;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Bytes read from the channel per poll.
const RECV_BUFFER_SIZE: usize = 4096;

/// Why the pump returned.
#[derive(Debug)]
pub enum PumpExit {
    /// `running` was cleared.
    Stopped,
    /// The remote end closed the channel.
    ChannelClosed,
    /// Reading failed; the channel is unusable.
    Failed(io::Error),
}

/// Run until stopped or the channel closes, passing each decoded chunk to `emit`.
pub fn run<F>(
    session: &TransportSession,
    running: &AtomicBool,
    poll_interval: Duration,
    mut emit: F,
) -> PumpExit
where
    F: FnMut(String),
{
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::default();

    let exit = loop {
        if !running.load(Ordering::Acquire) {
            break PumpExit::Stopped;
        }
        match session.try_recv(&mut buf) {
            Ok(Recv::Data(n)) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() {
                    emit(text);
                }
            }
            Ok(Recv::Empty) => std::thread::sleep(poll_interval),
            Ok(Recv::Closed) => break PumpExit::ChannelClosed,
            Err(error) => break PumpExit::Failed(error),
        }
    };

    let tail = decoder.finish();
    if !tail.is_empty() {
        emit(tail);
    }
    exit
}

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::with_capacity(self.pending.len());
        let mut offset = 0;
        while offset < self.pending.len() {
            match std::str::from_utf8(&self.pending[offset..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    offset = self.pending.len();
                }
                Err(error) => {
                    let valid_end = offset + error.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[offset..valid_end]));
                    match error.error_len() {
                        Some(invalid) => {
                            text.push(REPLACEMENT_CHARACTER);
                            offset = valid_end + invalid;
                        }
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            offset = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..offset);
        text
    }

    /// Flush whatever is held back. Never completes, so it is replaced.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        REPLACEMENT_CHARACTER.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRemote;
    use crate::transport::{ConnectRequest, Credential};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn open(remote: &FakeRemote) -> TransportSession {
        let request = ConnectRequest::new("host1", "u", Credential::password("p"));
        TransportSession::connect(&*remote.backend(), &request, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn decoder_passes_ascii_through() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ls -la\r\n"), "ls -la\r\n");
    }

    #[test]
    fn decoder_joins_split_character() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "héllo".as_bytes();
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn decoder_finish_replaces_dangling_prefix() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xe2\x82"), "ok");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn pump_forwards_chunks_in_order_until_remote_closes() {
        let remote = FakeRemote::linux();
        let session = open(&remote);
        remote.link().push_output(b"first ");
        remote.link().push_output(b"second");
        remote.link().close_remote();

        let running = AtomicBool::new(true);
        let mut chunks = Vec::new();
        let exit = run(&session, &running, Duration::from_millis(1), |chunk| {
            chunks.push(chunk)
        });

        assert!(matches!(exit, PumpExit::ChannelClosed));
        assert_eq!(chunks.concat(), "first second");
    }

    #[test]
    fn pump_splits_oversized_reads() {
        let remote = FakeRemote::linux();
        let session = open(&remote);
        let big = "x".repeat(RECV_BUFFER_SIZE * 2 + 10);
        remote.link().push_output(big.as_bytes());
        remote.link().close_remote();

        let running = AtomicBool::new(true);
        let mut received = String::new();
        run(&session, &running, Duration::from_millis(1), |chunk| {
            received.push_str(&chunk)
        });
        assert_eq!(received.len(), big.len());
    }

    #[test]
    fn pump_stops_promptly_when_flag_cleared() {
        let remote = FakeRemote::linux();
        let session = Arc::new(open(&remote));
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let session = session.clone();
            let running = running.clone();
            std::thread::spawn(move || run(&session, &running, Duration::from_millis(10), |_| {}))
        };
        std::thread::sleep(Duration::from_millis(30));
        running.store(false, Ordering::Release);

        let exit = worker.join().unwrap();
        assert!(matches!(exit, PumpExit::Stopped));
    }

    #[test]
    fn pump_survives_channel_closed_mid_poll() {
        let remote = FakeRemote::linux();
        let session = open(&remote);
        session.close();

        let running = AtomicBool::new(true);
        let exit = run(&session, &running, Duration::from_millis(1), |_| {});
        assert!(matches!(exit, PumpExit::ChannelClosed));
    }

    #[test]
    fn pump_reports_read_errors() {
        let remote = FakeRemote::linux();
        let session = open(&remote);
        remote.link().break_reads();

        let running = AtomicBool::new(true);
        let exit = run(&session, &running, Duration::from_millis(1), |_| {});
        assert!(matches!(exit, PumpExit::Failed(_)));
    }
}
