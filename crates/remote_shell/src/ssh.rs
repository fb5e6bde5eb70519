//! libssh2 backend.

use crate::transport::{
    ConnectError, ConnectRequest, Connection, Credential, ProbeError, Recv, RemoteHost, SendError,
    ShellChannel, SshBackend,
};
use secrecy::ExposeSecret;
use settings::SshConfig;
use ssh2::{Channel, ErrorCode, HashType, Session};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use util::ResultExt;

/// libssh2's `LIBSSH2_ERROR_TIMEOUT`.
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

/// Terminal requested for the interactive shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
}

impl PtyRequest {
    pub fn from_config(config: &SshConfig) -> Self {
        Self {
            term: config.terminal_type.clone(),
            cols: config.terminal_cols,
            rows: config.terminal_rows,
        }
    }
}

/// [`SshBackend`] over a plain TCP socket and libssh2.
///
/// Every host key is accepted; its SHA-256 fingerprint is logged so it can be
/// checked by hand.
#[derive(Debug, Clone)]
pub struct Ssh2Backend {
    pty: PtyRequest,
}

impl Ssh2Backend {
    pub fn new(pty: PtyRequest) -> Self {
        Self { pty }
    }

    pub fn from_config(config: &SshConfig) -> Self {
        Self::new(PtyRequest::from_config(config))
    }
}

impl SshBackend for Ssh2Backend {
    fn connect(
        &self,
        request: &ConnectRequest,
        timeout: Duration,
    ) -> Result<Connection, ConnectError> {
        let address = request.address();
        let deadline = Instant::now() + timeout;

        let tcp = open_socket(request, &address, timeout)?;
        let mut session = Session::new().map_err(|error| ConnectError::Handshake {
            address: address.clone(),
            reason: error.to_string(),
        })?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout_ms(deadline.saturating_duration_since(Instant::now())));

        session.handshake().map_err(|error| {
            if error.code() == ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) {
                ConnectError::Timeout {
                    address: address.clone(),
                    timeout,
                }
            } else {
                ConnectError::Handshake {
                    address: address.clone(),
                    reason: error.to_string(),
                }
            }
        })?;

        match session.host_key_hash(HashType::Sha256) {
            Some(hash) => tracing::info!(
                "Accepted host key for {} (SHA256 {})",
                address,
                fingerprint(hash)
            ),
            None => tracing::warn!("{} offered no host key hash", address),
        }

        authenticate(&session, request)?;

        let mut channel = session
            .channel_session()
            .map_err(|error| ConnectError::Channel(error.to_string()))?;
        channel
            .request_pty(
                &self.pty.term,
                None,
                Some((self.pty.cols, self.pty.rows, 0, 0)),
            )
            .map_err(|error| ConnectError::Channel(format!("PTY request refused: {}", error)))?;
        channel
            .shell()
            .map_err(|error| ConnectError::Channel(format!("shell request refused: {}", error)))?;

        // Streaming has no timeout; probes set their own.
        session.set_timeout(0);

        Ok(Connection {
            host: Box::new(Ssh2Host {
                session: session.clone(),
            }),
            shell: Box::new(Ssh2Shell {
                session,
                channel,
                closed: false,
            }),
        })
    }
}

fn open_socket(
    request: &ConnectRequest,
    address: &str,
    timeout: Duration,
) -> Result<TcpStream, ConnectError> {
    let addrs: Vec<SocketAddr> = (request.host.as_str(), request.port)
        .to_socket_addrs()
        .map_err(|source| ConnectError::Resolve {
            address: address.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectError::Resolve {
            address: address.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        });
    }

    let mut last_error = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => {
                tracing::debug!("TCP connected to {}", addr);
                return Ok(stream);
            }
            Err(error) => {
                tracing::debug!("TCP connect to {} failed: {}", addr, error);
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(error) if error.kind() == io::ErrorKind::TimedOut => Err(ConnectError::Timeout {
            address: address.to_string(),
            timeout,
        }),
        Some(source) => Err(ConnectError::Unreachable {
            address: address.to_string(),
            source,
        }),
        None => Err(ConnectError::Unreachable {
            address: address.to_string(),
            source: io::Error::new(io::ErrorKind::NotConnected, "no address accepted"),
        }),
    }
}

fn authenticate(session: &Session, request: &ConnectRequest) -> Result<(), ConnectError> {
    let username = request.username.as_str();
    let result = match &request.credential {
        Credential::Password(password) => {
            session.userauth_password(username, password.expose_secret())
        }
        Credential::Agent => session.userauth_agent(username),
    };
    let rejected = |reason: String| ConnectError::Authentication {
        username: username.to_string(),
        reason,
    };
    result.map_err(|error| rejected(error.to_string()))?;
    if !session.authenticated() {
        return Err(rejected("server did not accept the credentials".into()));
    }
    Ok(())
}

/// libssh2 timeouts are whole milliseconds and 0 means "none".
fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis())
        .unwrap_or(u32::MAX)
        .max(1)
}

fn fingerprint(hash: &[u8]) -> String {
    hash.iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

struct Ssh2Host {
    session: Session,
}

impl Ssh2Host {
    fn run(&self, command: &str) -> Result<String, ProbeError> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|error| ProbeError::new(command, error))?;
        channel
            .exec(command)
            .map_err(|error| ProbeError::new(command, error))?;
        let mut stdout = Vec::new();
        channel
            .read_to_end(&mut stdout)
            .map_err(|error| ProbeError::new(command, error))?;
        channel.wait_close().log_debug("closing probe channel");
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

impl RemoteHost for Ssh2Host {
    fn exec(&mut self, command: &str, timeout: Duration) -> Result<String, ProbeError> {
        self.session.set_timeout(timeout_ms(timeout));
        let result = self.run(command);
        self.session.set_timeout(0);
        result
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.session.disconnect(None, "session closed", None)?;
        Ok(())
    }
}

struct Ssh2Shell {
    session: Session,
    channel: Channel,
    closed: bool,
}

impl ShellChannel for Ssh2Shell {
    fn send_ready(&self) -> bool {
        !self.is_closed() && self.channel.write_window().remaining > 0
    }

    fn send(&mut self, data: &[u8]) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.channel.write_all(data)?;
        self.channel.flush()?;
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Recv> {
        // Blocking mode is per session. Only the shell uses the session while
        // streaming, and the caller holds the shell lock.
        self.session.set_blocking(false);
        let result = self.channel.read(buf);
        self.session.set_blocking(true);

        match result {
            Ok(0) if self.channel.eof() => Ok(Recv::Closed),
            Ok(0) => Ok(Recv::Empty),
            Ok(n) => Ok(Recv::Data(n)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                if self.channel.eof() {
                    Ok(Recv::Closed)
                } else {
                    Ok(Recv::Empty)
                }
            }
            Err(error) => Err(error),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed || self.channel.eof()
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.closed = true;
        self.channel.send_eof().log_debug("sending EOF");
        self.channel.close()?;
        Ok(())
    }
}
