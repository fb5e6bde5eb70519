//! Shared helpers for the session integration tests.

#![allow(dead_code)]

use remote_shell::test_support::{wait_until, FakeRemote, RecordingSink};
use remote_shell::{
    ConnectRequest, Credential, SessionController, SessionOptions, SessionState, ShellUpgrade,
};
use std::sync::Arc;
use std::time::Duration;

pub use remote_shell::test_support::{SinkEvent, LINUX_UNAME, WINDOWS_VER};

/// Options with every delay shrunk so tests run in milliseconds.
pub fn fast_options() -> SessionOptions {
    SessionOptions {
        poll_interval: Duration::from_millis(1),
        flush_interval: Duration::from_millis(10),
        clear_suppress: Duration::from_millis(100),
        upgrade: ShellUpgrade {
            settle: Duration::ZERO,
            ..ShellUpgrade::default()
        },
        ..SessionOptions::default()
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A controller wired to a scripted remote and a recording sink.
pub struct Harness {
    pub remote: FakeRemote,
    pub sink: Arc<RecordingSink>,
    pub controller: SessionController,
}

impl Harness {
    pub fn new(remote: FakeRemote) -> Self {
        Self::with_options(remote, fast_options())
    }

    pub fn with_options(remote: FakeRemote, options: SessionOptions) -> Self {
        let sink = RecordingSink::new();
        let controller = SessionController::new(remote.backend(), sink.clone(), options);
        Self {
            remote,
            sink,
            controller,
        }
    }

    pub fn connect(&self) {
        self.controller
            .connect(request())
            .expect("session threads start");
    }

    /// Connect and wait until commands are accepted.
    pub fn connect_streaming(&self) {
        self.connect();
        self.wait_for_state(SessionState::Streaming);
    }

    pub fn wait_for_state(&self, state: SessionState) {
        wait_until(&format!("{:?}", state), || self.controller.state() == state);
    }

    pub fn wait_for_screen(&self, expected: &str) {
        wait_until(&format!("screen {:?}", expected), || {
            self.sink.screen() == expected
        });
    }

    pub fn wait_for_event(&self, event: SinkEvent) {
        wait_until(&format!("{:?}", event), || self.sink.contains(&event));
    }
}

pub fn request() -> ConnectRequest {
    ConnectRequest::new("host1", "admin", Credential::password("secret"))
}
