//! Authenticated remote shell connection.
//!
//! [`TransportSession`] owns one connection plus its interactive shell channel
//! and is the only handle the rest of the crate touches. The wire work is
//! delegated to an [`SshBackend`], so any SSH client that can connect, open a
//! shell, run one-shot commands, and move bytes can be swapped in.

use parking_lot::Mutex;
use secrecy::SecretString;
use std::io;
use std::time::Duration;
use thiserror::Error;
use util::ResultExt;

/// How the user proves who they are.
#[derive(Debug)]
pub enum Credential {
    Password(SecretString),
    /// Use keys offered by a running SSH agent.
    Agent,
}

impl Credential {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password(SecretString::from(password.into()))
    }
}

/// Everything needed to open a session.
#[derive(Debug)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

impl ConnectRequest {
    pub fn new(host: impl Into<String>, username: impl Into<String>, credential: Credential) -> Self {
        Self {
            host: host.into(),
            port: settings::constants::ssh::DEFAULT_PORT,
            username: username.into(),
            credential,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port`, bracketing bare IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Why a connection could not be established.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("{address} is unreachable: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out connecting to {address} after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
    #[error("SSH handshake with {address} failed: {reason}")]
    Handshake { address: String, reason: String },
    #[error("authentication failed for {username}: {reason}")]
    Authentication { username: String, reason: String },
    #[error("could not open a shell: {0}")]
    Channel(String),
}

/// A one-shot command could not be run to completion.
#[derive(Debug, Error)]
#[error("probe `{command}` failed: {reason}")]
pub struct ProbeError {
    pub command: String,
    pub reason: String,
}

impl ProbeError {
    pub fn new(command: &str, reason: impl ToString) -> Self {
        Self {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Bytes could not be written to the shell channel.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("channel is not ready to send")]
    NotReady,
    #[error("channel is closed")]
    Closed,
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// Result of a non-blocking channel read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recv {
    /// This many bytes were written into the buffer.
    Data(usize),
    /// Nothing pending right now.
    Empty,
    /// The remote end hung up.
    Closed,
}

/// Connected host and its interactive shell, as produced by a backend.
pub struct Connection {
    pub host: Box<dyn RemoteHost>,
    pub shell: Box<dyn ShellChannel>,
}

/// An SSH client implementation.
pub trait SshBackend: Send + Sync {
    /// Connect, authenticate and open an interactive shell, all within `timeout`.
    fn connect(&self, request: &ConnectRequest, timeout: Duration)
        -> Result<Connection, ConnectError>;
}

/// The authenticated connection, used for one-shot commands.
pub trait RemoteHost: Send {
    /// Run `command` to completion and return its standard output.
    fn exec(&mut self, command: &str, timeout: Duration) -> Result<String, ProbeError>;

    fn close(&mut self) -> anyhow::Result<()>;
}

/// The interactive shell channel.
pub trait ShellChannel: Send {
    fn send_ready(&self) -> bool;

    fn send(&mut self, data: &[u8]) -> Result<(), SendError>;

    /// Read whatever is pending without blocking.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Recv>;

    fn is_closed(&self) -> bool;

    fn close(&mut self) -> anyhow::Result<()>;
}

/// One live connection with its shell channel.
///
/// The shell is written by the submitting thread and read by the output pump
/// at the same time, so both halves sit behind their own lock. Closing takes
/// the halves out, which makes every later call see a closed session.
pub struct TransportSession {
    address: String,
    host: Mutex<Option<Box<dyn RemoteHost>>>,
    shell: Mutex<Option<Box<dyn ShellChannel>>>,
}

impl TransportSession {
    /// Open a session through `backend`. Either fully usable or an error.
    pub fn connect(
        backend: &dyn SshBackend,
        request: &ConnectRequest,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let address = request.address();
        tracing::info!("Connecting to {} as {}", address, request.username);
        let Connection { host, shell } = backend.connect(request, timeout)?;
        tracing::info!("Shell channel open on {}", address);
        Ok(Self::from_parts(address, host, shell))
    }

    pub fn from_parts(
        address: String,
        host: Box<dyn RemoteHost>,
        shell: Box<dyn ShellChannel>,
    ) -> Self {
        Self {
            address,
            host: Mutex::new(Some(host)),
            shell: Mutex::new(Some(shell)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run a one-shot command on the connection (not the shell channel).
    pub fn exec(&self, command: &str, timeout: Duration) -> Result<String, ProbeError> {
        match self.host.lock().as_mut() {
            Some(host) => host.exec(command, timeout),
            None => Err(ProbeError::new(command, "session is closed")),
        }
    }

    pub fn send_ready(&self) -> bool {
        self.shell
            .lock()
            .as_ref()
            .is_some_and(|shell| shell.send_ready())
    }

    /// Write to the shell, refusing when the channel is not ready.
    pub fn send(&self, data: &[u8]) -> Result<(), SendError> {
        let mut guard = self.shell.lock();
        let shell = guard.as_mut().ok_or(SendError::Closed)?;
        if !shell.send_ready() {
            return Err(SendError::NotReady);
        }
        shell.send(data)
    }

    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<Recv> {
        match self.shell.lock().as_mut() {
            Some(shell) => shell.try_recv(buf),
            None => Ok(Recv::Closed),
        }
    }

    pub fn is_open(&self) -> bool {
        self.shell
            .lock()
            .as_ref()
            .is_some_and(|shell| !shell.is_closed())
    }

    /// Release the channel and the connection. Safe to call any number of times.
    pub fn close(&self) {
        let shell = self.shell.lock().take();
        let host = self.host.lock().take();
        if shell.is_none() && host.is_none() {
            return;
        }
        if let Some(mut shell) = shell {
            shell.close().log_debug("closing shell channel");
        }
        if let Some(mut host) = host {
            host.close().log_debug("closing connection");
        }
        tracing::info!("Closed session to {}", self.address);
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.close();
    }
}
