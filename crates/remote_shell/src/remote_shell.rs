//! Interactive remote shell sessions.
//!
//! Connects over SSH, works out what operating system is on the other end,
//! adapts line endings (and on Windows the shell itself) to it, and streams
//! batched, escape-free output to a [`DisplaySink`].

pub mod controller;
pub mod history;
pub mod os_detect;
pub mod output;
pub mod pump;
pub mod shell_adapter;
pub mod sink;
pub mod ssh;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use controller::{SessionController, SessionOptions, SessionState};
pub use history::CommandHistory;
pub use os_detect::OsKind;
pub use shell_adapter::{LineEnding, ShellUpgrade};
pub use sink::DisplaySink;
pub use ssh::{PtyRequest, Ssh2Backend};
pub use transport::{ConnectError, ConnectRequest, Credential, SshBackend, TransportSession};
