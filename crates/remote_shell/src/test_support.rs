//! Test doubles for the SSH session stack.
//!
//! Compiled for this crate's own tests and for dependents that enable the
//! `test-support` feature.
//!
//! # Overview
//!
//! - `FakeRemote` - scripted SSH backend: probe replies, queued output, connect failures, delays
//! - `FakeLink` - one fake connection, inspectable after the fact
//! - `RecordingSink` - `DisplaySink` that records every call in order
//! - `wait_until` - poll a condition with a deadline

use crate::os_detect::OsKind;
use crate::sink::DisplaySink;
use crate::transport::{
    ConnectError, ConnectRequest, Connection, ProbeError, Recv, RemoteHost, SendError,
    ShellChannel, SshBackend,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default deadline for `wait_until`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Kernel string a Linux host answers `uname -a` with.
pub const LINUX_UNAME: &str =
    "Linux host1 5.15.0-91-generic #101-Ubuntu SMP Tue Nov 14 13:30:08 UTC 2023 x86_64 GNU/Linux";

/// Version banner a Windows host answers `ver` with.
pub const WINDOWS_VER: &str = "\r\nMicrosoft Windows [Version 10.0.19045.3803]\r\n";

// ============================================================================
// Fake Remote
// ============================================================================

enum ProbeReply {
    Output(String),
    Fail(String),
}

#[derive(Default)]
struct RemoteState {
    probes: Mutex<HashMap<String, ProbeReply>>,
    probes_run: Mutex<Vec<String>>,
    connect_failure: Mutex<Option<ConnectError>>,
    connect_delay: Mutex<Duration>,
    probe_delay: Mutex<Duration>,
    links: Mutex<Vec<Arc<FakeLink>>>,
}

/// Scripted remote host. Clones share state.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<RemoteState>,
}

impl FakeRemote {
    /// A host that answers no probe (classifies as Unknown).
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that answers `uname -a`.
    pub fn linux() -> Self {
        Self::new().with_probe("uname -a", LINUX_UNAME)
    }

    /// A host that answers only `ver`.
    pub fn windows() -> Self {
        Self::new().with_probe("ver", WINDOWS_VER)
    }

    pub fn with_probe(self, command: &str, output: &str) -> Self {
        self.state
            .probes
            .lock()
            .insert(command.to_string(), ProbeReply::Output(output.to_string()));
        self
    }

    /// Make `command` fail to execute.
    pub fn with_failing_probe(self, command: &str) -> Self {
        self.state
            .probes
            .lock()
            .insert(command.to_string(), ProbeReply::Fail("exec refused".into()));
        self
    }

    /// Make the next connect attempt fail with `error`.
    pub fn fail_next_connect(&self, error: ConnectError) {
        *self.state.connect_failure.lock() = Some(error);
    }

    /// Make every connect attempt take this long.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    /// Make probes on connections opened from now on take this long.
    pub fn set_probe_delay(&self, delay: Duration) {
        *self.state.probe_delay.lock() = delay;
    }

    pub fn backend(&self) -> Arc<dyn SshBackend> {
        Arc::new(FakeBackend {
            remote: self.clone(),
        })
    }

    /// Probe commands in the order they ran, across all connections.
    pub fn probes_run(&self) -> Vec<String> {
        self.state.probes_run.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.state.links.lock().len()
    }

    /// The most recent connection.
    ///
    /// # Panics
    /// If nothing has connected yet.
    pub fn link(&self) -> Arc<FakeLink> {
        self.state
            .links
            .lock()
            .last()
            .cloned()
            .expect("no connection has been made")
    }

    /// The `index`-th connection.
    pub fn link_at(&self, index: usize) -> Arc<FakeLink> {
        self.state.links.lock()[index].clone()
    }

    fn run_probe(&self, command: &str) -> Result<String, ProbeError> {
        self.state.probes_run.lock().push(command.to_string());
        match self.state.probes.lock().get(command) {
            Some(ProbeReply::Output(output)) => Ok(output.clone()),
            Some(ProbeReply::Fail(reason)) => Err(ProbeError::new(command, reason)),
            None => Ok(String::new()),
        }
    }
}

struct FakeBackend {
    remote: FakeRemote,
}

impl SshBackend for FakeBackend {
    fn connect(
        &self,
        _request: &ConnectRequest,
        _timeout: Duration,
    ) -> Result<Connection, ConnectError> {
        let delay = *self.remote.state.connect_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(error) = self.remote.state.connect_failure.lock().take() {
            return Err(error);
        }
        let link = Arc::new(FakeLink::new());
        self.remote.state.links.lock().push(link.clone());
        Ok(Connection {
            host: Box::new(FakeHost {
                remote: self.remote.clone(),
                link: link.clone(),
                probe_delay: *self.remote.state.probe_delay.lock(),
            }),
            shell: Box::new(FakeShell { link }),
        })
    }
}

// ============================================================================
// Fake Link
// ============================================================================

/// State of one fake connection.
pub struct FakeLink {
    sent: Mutex<Vec<String>>,
    incoming: Mutex<VecDeque<Vec<u8>>>,
    send_ready: AtomicBool,
    remote_closed: AtomicBool,
    read_error: AtomicBool,
    shell_closed: AtomicBool,
    host_closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl FakeLink {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            incoming: Mutex::new(VecDeque::new()),
            send_ready: AtomicBool::new(true),
            remote_closed: AtomicBool::new(false),
            read_error: AtomicBool::new(false),
            shell_closed: AtomicBool::new(false),
            host_closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Queue bytes for the shell to "receive".
    pub fn push_output(&self, bytes: &[u8]) {
        self.incoming.lock().push_back(bytes.to_vec());
    }

    /// Simulate the remote end hanging up.
    pub fn close_remote(&self) {
        self.remote_closed.store(true, Ordering::SeqCst);
    }

    /// Make the next read fail with an I/O error.
    pub fn break_reads(&self) {
        self.read_error.store(true, Ordering::SeqCst);
    }

    pub fn set_send_ready(&self, ready: bool) {
        self.send_ready.store(ready, Ordering::SeqCst);
    }

    /// Every write to the shell, one entry per `send`.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Whether both halves were closed locally.
    pub fn is_closed(&self) -> bool {
        self.shell_closed.load(Ordering::SeqCst) && self.host_closed.load(Ordering::SeqCst)
    }

    /// Number of `close` calls on either half.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

struct FakeHost {
    remote: FakeRemote,
    link: Arc<FakeLink>,
    probe_delay: Duration,
}

impl RemoteHost for FakeHost {
    fn exec(&mut self, command: &str, _timeout: Duration) -> Result<String, ProbeError> {
        if !self.probe_delay.is_zero() {
            std::thread::sleep(self.probe_delay);
        }
        self.remote.run_probe(command)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.link.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.link.host_closed.swap(true, Ordering::SeqCst) {
            anyhow::bail!("connection already closed");
        }
        Ok(())
    }
}

struct FakeShell {
    link: Arc<FakeLink>,
}

impl ShellChannel for FakeShell {
    fn send_ready(&self) -> bool {
        self.link.send_ready.load(Ordering::SeqCst) && !self.is_closed()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.link
            .sent
            .lock()
            .push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Recv> {
        if self.link.read_error.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
        }
        if self.link.shell_closed.load(Ordering::SeqCst) {
            return Ok(Recv::Closed);
        }
        let mut incoming = self.link.incoming.lock();
        match incoming.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    incoming.push_front(chunk.split_off(n));
                }
                Ok(Recv::Data(n))
            }
            None if self.link.remote_closed.load(Ordering::SeqCst) => Ok(Recv::Closed),
            None => Ok(Recv::Empty),
        }
    }

    fn is_closed(&self) -> bool {
        self.link.shell_closed.load(Ordering::SeqCst) || self.link.remote_closed.load(Ordering::SeqCst)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.link.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.link.shell_closed.swap(true, Ordering::SeqCst) {
            anyhow::bail!("channel already closed");
        }
        Ok(())
    }
}

// ============================================================================
// Recording Sink
// ============================================================================

/// One call made on a `DisplaySink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Append(String),
    Clear,
    Connected(String),
    ConnectionFailed(String),
    OsDetected(OsKind),
    Disconnected,
}

/// `DisplaySink` that records calls in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn contains(&self, event: &SinkEvent) -> bool {
        self.events.lock().contains(event)
    }

    /// Appended text since the last clear.
    pub fn screen(&self) -> String {
        let mut screen = String::new();
        for event in self.events.lock().iter() {
            match event {
                SinkEvent::Append(text) => screen.push_str(text),
                SinkEvent::Clear => screen.clear(),
                _ => {}
            }
        }
        screen
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }
}

impl DisplaySink for RecordingSink {
    fn append(&self, text: &str) {
        self.record(SinkEvent::Append(text.to_string()));
    }

    fn clear(&self) {
        self.record(SinkEvent::Clear);
    }

    fn connected(&self, address: &str) {
        self.record(SinkEvent::Connected(address.to_string()));
    }

    fn connection_failed(&self, error: &ConnectError) {
        self.record(SinkEvent::ConnectionFailed(error.to_string()));
    }

    fn os_detected(&self, os: OsKind) {
        self.record(SinkEvent::OsDetected(os));
    }

    fn disconnected(&self) {
        self.record(SinkEvent::Disconnected);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll `condition` every millisecond until it holds.
///
/// # Panics
/// If it does not hold within [`DEFAULT_TIMEOUT`].
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + DEFAULT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(1));
    }
}
