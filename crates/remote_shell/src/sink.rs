//! Display side of a session.

use crate::os_detect::OsKind;
use crate::transport::ConnectError;

/// Where session output and status go.
///
/// Mostly called from the session's own threads. `clear` may also come from
/// the caller of `connect` or `submit`. Implementations that drive a UI
/// should hand calls off to their own event loop.
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
pub trait DisplaySink: Send + Sync {
    /// Append already-cleaned text.
    fn append(&self, text: &str);

    fn clear(&self);

    /// The shell channel is open; detection has not run yet.
    fn connected(&self, address: &str);

    fn connection_failed(&self, error: &ConnectError);

    fn os_detected(&self, os: OsKind);

    /// The session ended (stopped, closed by the remote, or broken).
    fn disconnected(&self);
}
