//! Session lifecycle.
//!
//! [`SessionController`] runs one remote shell at a time. A connect request
//! spawns two threads for the session:
//!
//! - the worker connects, detects the OS, adapts the shell, then runs the
//!   output pump until the session ends, and finally tears everything down;
//! - the flusher writes batched output to the display every flush interval.
//!
//! Every session gets its own shared state, so threads left over from a
//! previous session can never write into the current one.

use crate::history::CommandHistory;
use crate::os_detect::{self, OsKind};
use crate::output::{SharedOutput, CLEAR_COMMAND};
use crate::pump::{self, PumpExit};
use crate::shell_adapter::{self, LineEnding, ShellUpgrade};
use crate::sink::DisplaySink;
use crate::transport::{ConnectRequest, SshBackend, TransportSession};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use settings::SshConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connect request yet.
    #[default]
    Idle,
    Connecting,
    Detecting,
    Streaming,
    Closed,
    /// Connecting failed, or the channel broke while streaming.
    Failed,
}

impl SessionState {
    /// `Closed` or `Failed`; the session will not change state again.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Timing and shell settings for sessions.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub flush_interval: Duration,
    /// How long `stop` waits for the worker to finish tearing down.
    pub stop_grace: Duration,
    /// How long output is ignored after a local `clear`.
    pub clear_suppress: Duration,
    pub upgrade: ShellUpgrade,
}

impl SessionOptions {
    pub fn from_config(config: &SshConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            probe_timeout: config.probe_timeout(),
            poll_interval: config.poll_interval(),
            flush_interval: config.flush_interval(),
            stop_grace: config.stop_grace(),
            clear_suppress: config.clear_suppress(),
            upgrade: ShellUpgrade::from_config(config),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&SshConfig::default())
    }
}

/// State of one session, shared by the controller and the session threads.
struct SessionShared {
    id: Uuid,
    running: AtomicBool,
    /// Cleared when `stop` gives up waiting. A detached session no longer
    /// owns the sink.
    attached: Mutex<bool>,
    state: Mutex<SessionState>,
    os: Mutex<OsKind>,
    line_ending: Mutex<LineEnding>,
    transport: Mutex<Option<Arc<TransportSession>>>,
    output: SharedOutput,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            running: AtomicBool::new(true),
            attached: Mutex::new(true),
            state: Mutex::new(SessionState::Connecting),
            os: Mutex::new(OsKind::Unknown),
            line_ending: Mutex::new(LineEnding::default()),
            transport: Mutex::new(None),
            output: SharedOutput::default(),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn detach(&self) {
        *self.attached.lock() = false;
    }

    /// Run `call` against `sink` unless the session was detached. The check
    /// and the call happen under one lock, so `detach` returning means no
    /// further calls reach the sink.
    fn notify(&self, sink: &dyn DisplaySink, call: impl FnOnce(&dyn DisplaySink)) {
        let attached = self.attached.lock();
        if *attached {
            call(sink);
        }
    }

    fn flush_to(&self, sink: &dyn DisplaySink) {
        self.notify(sink, |sink| {
            self.output.flush(sink);
        });
    }

    fn set_state(&self, next: SessionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous.is_finished() && previous != next {
            util::debug_panic!("session left finished state {:?} for {:?}", previous, next);
        }
        if previous != next {
            tracing::info!("Session state {:?} -> {:?}", previous, next);
        }
    }
}

struct ActiveSession {
    shared: Arc<SessionShared>,
    /// Signalled by the worker once teardown is complete. Taken by `stop`.
    done: Option<Receiver<()>>,
}

/// Runs at most one remote shell session and routes its output to a sink.
///
/// All methods take `&self`, so the controller can be shared behind an `Arc`
/// and stopped from any thread.
pub struct SessionController {
    backend: Arc<dyn SshBackend>,
    sink: Arc<dyn DisplaySink>,
    options: SessionOptions,
    active: Mutex<Option<ActiveSession>>,
    /// Held across stop-then-install so concurrent connects cannot orphan a session.
    connect_gate: Mutex<()>,
    history: Mutex<CommandHistory>,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn SshBackend>,
        sink: Arc<dyn DisplaySink>,
        options: SessionOptions,
    ) -> Self {
        Self {
            backend,
            sink,
            options,
            active: Mutex::new(None),
            connect_gate: Mutex::new(()),
            history: Mutex::new(CommandHistory::new()),
        }
    }

    /// Start a new session, stopping any previous one first.
    ///
    /// Returns once the session threads are running; the connection itself
    /// is made in the background and reported through the sink.
    pub fn connect(&self, request: ConnectRequest) -> Result<()> {
        let _gate = self.connect_gate.lock();
        self.stop();
        self.sink.clear();

        let shared = Arc::new(SessionShared::new());
        let span = tracing::info_span!("ssh_session", id = %shared.id, host = %request.host);
        let (done_tx, done_rx) = mpsc::channel();

        let worker = SessionWorker {
            shared: shared.clone(),
            backend: self.backend.clone(),
            sink: self.sink.clone(),
            options: self.options.clone(),
            done: done_tx,
        };
        let worker_span = span.clone();
        thread::Builder::new()
            .name("toolbelt-ssh-session".into())
            .spawn(move || {
                let _entered = worker_span.enter();
                worker.run(request);
            })
            .context("failed to spawn SSH session thread")?;

        let flush_shared = shared.clone();
        let flush_sink = self.sink.clone();
        let flush_interval = self.options.flush_interval;
        let spawned = thread::Builder::new()
            .name("toolbelt-ssh-flush".into())
            .spawn(move || {
                let _entered = span.enter();
                flush_loop(&flush_shared, &*flush_sink, flush_interval);
            });
        if let Err(error) = spawned {
            shared.running.store(false, Ordering::Release);
            return Err(error).context("failed to spawn SSH output thread");
        }

        *self.active.lock() = Some(ActiveSession {
            shared,
            done: Some(done_rx),
        });
        Ok(())
    }

    /// Send `text` to the remote shell and record it in history.
    ///
    /// Text is trimmed and blank submissions are ignored, as is anything
    /// submitted outside [`SessionState::Streaming`]. A channel that is not
    /// ready to send drops the command without queuing it.
    pub fn submit(&self, text: &str) {
        let command = text.trim();
        if command.is_empty() {
            return;
        }
        let Some(shared) = self.current() else {
            tracing::debug!("Ignoring command with no session");
            return;
        };
        let state = shared.state();
        if state != SessionState::Streaming || !shared.is_running() {
            tracing::debug!("Ignoring command while {:?}", state);
            return;
        }
        // The worker may have torn down since the state check.
        let Some(transport) = shared.transport.lock().clone() else {
            tracing::debug!("Ignoring command, session is closing");
            return;
        };

        if command == CLEAR_COMMAND {
            shared
                .output
                .clear_display(&*self.sink, self.options.clear_suppress);
        }

        let line = shared.line_ending.lock().terminate(command);
        match transport.send(line.as_bytes()) {
            Ok(()) => tracing::debug!("Sent {:?}", command),
            Err(error) => tracing::debug!("dropping command {:?}: {}", command, error),
        }
        self.history.lock().record(command);
    }

    /// End the current session.
    ///
    /// Signals the session threads and waits up to the stop grace period for
    /// teardown. Calling it again, or with no session, returns immediately.
    pub fn stop(&self) {
        let (shared, done) = {
            let mut active = self.active.lock();
            let Some(session) = active.as_mut() else {
                return;
            };
            let Some(done) = session.done.take() else {
                return;
            };
            (session.shared.clone(), done)
        };

        shared.running.store(false, Ordering::Release);
        match done.recv_timeout(self.options.stop_grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Session {} still tearing down after {:?}, detaching it",
                    shared.id,
                    self.options.stop_grace
                );
                shared.detach();
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.current()
            .map_or(SessionState::Idle, |shared| shared.state())
    }

    pub fn os_kind(&self) -> OsKind {
        self.current()
            .map_or(OsKind::Unknown, |shared| *shared.os.lock())
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.current().map(|shared| shared.id)
    }

    /// Previous history entry; `current_input` is kept as the draft.
    pub fn recall_previous(&self, current_input: &str) -> Option<String> {
        self.history
            .lock()
            .recall_previous(current_input)
            .map(str::to_string)
    }

    pub fn recall_next(&self) -> String {
        self.history.lock().recall_next().to_string()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().entries().to_vec()
    }

    pub fn history_cursor(&self) -> usize {
        self.history.lock().cursor()
    }

    fn current(&self) -> Option<Arc<SessionShared>> {
        self.active
            .lock()
            .as_ref()
            .map(|session| session.shared.clone())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the session thread owns.
struct SessionWorker {
    shared: Arc<SessionShared>,
    backend: Arc<dyn SshBackend>,
    sink: Arc<dyn DisplaySink>,
    options: SessionOptions,
    done: Sender<()>,
}

impl SessionWorker {
    fn run(self, request: ConnectRequest) {
        let transport =
            match TransportSession::connect(&*self.backend, &request, self.options.connect_timeout)
            {
                Ok(transport) => Arc::new(transport),
                Err(error) => {
                    let stopped = !self.shared.running.swap(false, Ordering::AcqRel);
                    if stopped {
                        tracing::debug!("Connect failed after stop: {}", error);
                        self.shared.set_state(SessionState::Closed);
                    } else {
                        tracing::warn!("Connection failed: {}", error);
                        self.shared.set_state(SessionState::Failed);
                        self.shared.notify(&*self.sink, |sink| sink.connection_failed(&error));
                    }
                    self.finish();
                    return;
                }
            };

        if !self.shared.is_running() {
            tracing::debug!("Stopped while connecting");
            transport.close();
            self.shared.set_state(SessionState::Closed);
            self.finish();
            return;
        }

        *self.shared.transport.lock() = Some(transport.clone());
        self.shared.notify(&*self.sink, |sink| sink.connected(transport.address()));

        self.shared.set_state(SessionState::Detecting);
        let os = os_detect::detect(&transport, self.options.probe_timeout);
        tracing::info!("Detected remote OS: {}", os);
        *self.shared.os.lock() = os;
        if !self.shared.is_running() {
            tracing::debug!("Stopped while detecting");
            self.teardown(&transport, SessionState::Closed);
            return;
        }
        self.shared.notify(&*self.sink, |sink| sink.os_detected(os));
        let line_ending = shell_adapter::adapt(&transport, os, &self.options.upgrade);
        *self.shared.line_ending.lock() = line_ending;

        self.shared.set_state(SessionState::Streaming);
        let output = &self.shared.output;
        let exit = pump::run(
            &transport,
            &self.shared.running,
            self.options.poll_interval,
            |chunk| {
                output.push(chunk);
            },
        );
        self.shared.running.store(false, Ordering::Release);

        let end_state = match exit {
            PumpExit::Stopped => SessionState::Closed,
            PumpExit::ChannelClosed => {
                tracing::info!("Remote closed the channel");
                SessionState::Closed
            }
            PumpExit::Failed(error) => {
                tracing::warn!("Reading from the channel failed: {}", error);
                SessionState::Failed
            }
        };

        self.teardown(&transport, end_state);
    }

    /// Final flush, close, final state, then `disconnected`.
    fn teardown(&self, transport: &TransportSession, end_state: SessionState) {
        self.shared.flush_to(&*self.sink);
        self.shared.transport.lock().take();
        transport.close();
        self.shared.set_state(end_state);
        self.shared.notify(&*self.sink, |sink| sink.disconnected());
        self.finish();
    }

    fn finish(&self) {
        // Nobody waits when the session ended on its own.
        self.done.send(()).ok();
    }
}

/// Flush batched output every `interval` until the session stops.
fn flush_loop(shared: &SessionShared, sink: &dyn DisplaySink, interval: Duration) {
    while shared.is_running() {
        thread::sleep(interval);
        shared.flush_to(sink);
    }
    shared.flush_to(sink);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{wait_until, FakeRemote, RecordingSink, SinkEvent};
    use crate::transport::Credential;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn quick_options() -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(1),
            flush_interval: Duration::from_millis(10),
            upgrade: ShellUpgrade {
                settle: Duration::ZERO,
                ..ShellUpgrade::default()
            },
            ..SessionOptions::default()
        }
    }

    fn controller(remote: &FakeRemote) -> (SessionController, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let controller = SessionController::new(remote.backend(), sink.clone(), quick_options());
        (controller, sink)
    }

    fn request() -> ConnectRequest {
        ConnectRequest::new("host1", "u", Credential::password("p"))
    }

    fn streaming(controller: &SessionController) {
        wait_until("streaming", || controller.state() == SessionState::Streaming);
    }

    #[test]
    fn starts_idle() {
        let remote = FakeRemote::linux();
        let (controller, _sink) = controller(&remote);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.os_kind(), OsKind::Unknown);
        assert_eq!(controller.session_id(), None);
    }

    #[test]
    fn options_follow_config() {
        let config = SshConfig {
            flush_interval_ms: 75,
            stop_grace_ms: 250,
            ..SshConfig::default()
        };
        let options = SessionOptions::from_config(&config);
        assert_eq!(options.flush_interval, Duration::from_millis(75));
        assert_eq!(options.stop_grace, Duration::from_millis(250));
        assert_eq!(options.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn blank_and_early_submissions_are_ignored() {
        let remote = FakeRemote::linux();
        let (controller, _sink) = controller(&remote);
        controller.submit("ls");
        assert!(controller.history().is_empty());

        controller.connect(request()).unwrap();
        streaming(&controller);
        controller.submit("   ");
        controller.submit("");
        assert!(remote.link().sent().is_empty());
        assert!(controller.history().is_empty());
    }

    #[test]
    fn submission_is_trimmed_and_recorded() {
        let remote = FakeRemote::linux();
        let (controller, _sink) = controller(&remote);
        controller.connect(request()).unwrap();
        streaming(&controller);

        controller.submit("  uptime \n");
        assert_eq!(remote.link().sent(), vec!["uptime\n".to_string()]);
        assert_eq!(controller.history(), vec!["uptime".to_string()]);
        assert_eq!(controller.history_cursor(), 1);
    }

    #[test]
    #[traced_test]
    fn unready_channel_drops_command_but_keeps_history() {
        let remote = FakeRemote::linux();
        let (controller, _sink) = controller(&remote);
        controller.connect(request()).unwrap();
        streaming(&controller);

        remote.link().set_send_ready(false);
        controller.submit("ls");
        assert!(remote.link().sent().is_empty());
        assert_eq!(controller.history(), vec!["ls".to_string()]);
        assert!(logs_contain("dropping command"));
    }

    #[test]
    fn history_recall_round_trips_through_controller() {
        let remote = FakeRemote::linux();
        let (controller, _sink) = controller(&remote);
        controller.connect(request()).unwrap();
        streaming(&controller);

        controller.submit("one");
        controller.submit("two");
        assert_eq!(controller.recall_previous("dra").as_deref(), Some("two"));
        assert_eq!(controller.recall_previous("two").as_deref(), Some("one"));
        assert_eq!(controller.recall_next(), "two");
        assert_eq!(controller.recall_next(), "dra");
    }

    #[test]
    fn connect_clears_sink_first() {
        let remote = FakeRemote::linux();
        let (controller, sink) = controller(&remote);
        controller.connect(request()).unwrap();
        streaming(&controller);
        assert_eq!(sink.events().first(), Some(&SinkEvent::Clear));
    }

    #[test]
    fn stop_waits_for_teardown() {
        let remote = FakeRemote::linux();
        let (controller, sink) = controller(&remote);
        controller.connect(request()).unwrap();
        streaming(&controller);

        controller.stop();
        assert_eq!(controller.state(), SessionState::Closed);
        assert!(remote.link().is_closed());
        assert_eq!(sink.events().last(), Some(&SinkEvent::Disconnected));
    }

    #[test]
    fn stop_during_slow_connect_is_bounded() {
        let remote = FakeRemote::linux();
        remote.set_connect_delay(Duration::from_millis(300));
        let sink = RecordingSink::new();
        let controller = SessionController::new(
            remote.backend(),
            sink.clone(),
            SessionOptions {
                stop_grace: Duration::from_millis(20),
                ..quick_options()
            },
        );
        controller.connect(request()).unwrap();

        let started = std::time::Instant::now();
        controller.stop();
        assert!(started.elapsed() < Duration::from_millis(250));

        wait_until("late connect closed", || {
            controller.state() == SessionState::Closed
        });
        assert!(remote.link().is_closed());
        assert!(!sink.contains(&SinkEvent::Connected("host1:22".into())));
    }

    #[test]
    fn detached_session_never_reaches_sink() {
        let remote = FakeRemote::linux();
        remote.set_probe_delay(Duration::from_millis(400));
        let sink = RecordingSink::new();
        let controller = SessionController::new(
            remote.backend(),
            sink.clone(),
            SessionOptions {
                stop_grace: Duration::from_millis(20),
                ..quick_options()
            },
        );
        controller.connect(request()).unwrap();
        wait_until("detecting", || controller.state() == SessionState::Detecting);

        remote.set_probe_delay(Duration::ZERO);
        controller.connect(request()).unwrap();
        streaming(&controller);

        wait_until("old connection closed", || remote.link_at(0).is_closed());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(controller.state(), SessionState::Streaming);
        assert!(!remote.link_at(1).is_closed());
        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Clear,
                SinkEvent::Connected("host1:22".into()),
                SinkEvent::Clear,
                SinkEvent::Connected("host1:22".into()),
                SinkEvent::OsDetected(OsKind::Linux),
            ]
        );
    }

    #[test]
    fn concurrent_connects_leave_no_untracked_session() {
        const CALLERS: usize = 8;
        let remote = FakeRemote::linux();
        let sink = RecordingSink::new();
        let controller = Arc::new(SessionController::new(
            remote.backend(),
            sink,
            quick_options(),
        ));
        let barrier = Arc::new(std::sync::Barrier::new(CALLERS));

        let callers: Vec<_> = (0..CALLERS)
            .map(|_| {
                let controller = controller.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    controller.connect(request()).unwrap();
                })
            })
            .collect();
        for caller in callers {
            caller.join().unwrap();
        }

        controller.stop();
        wait_until("every connection closed", || {
            remote.connection_count() == CALLERS
                && (0..CALLERS).all(|index| remote.link_at(index).is_closed())
        });
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[test]
    fn new_session_gets_new_id() {
        let remote = FakeRemote::linux();
        let (controller, _sink) = controller(&remote);
        controller.connect(request()).unwrap();
        let first = controller.session_id();
        controller.connect(request()).unwrap();
        let second = controller.session_id();
        assert!(first.is_some());
        assert_ne!(first, second);
    }
}
