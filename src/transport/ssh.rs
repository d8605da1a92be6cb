//! SSH implementation of the transport on top of libssh2

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use ssh2::{Channel, KeyboardInteractivePrompt, Prompt, Session};
use tracing::{debug, info, warn};

use super::{ConnectError, ConnectTarget, Connector, Transport, TransportError};

/// How long a single write may keep hitting `WouldBlock`
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keepalive interval in seconds
const KEEPALIVE_SECS: u32 = 30;

/// How long a split multi-byte sequence may wait for its remaining bytes
const PARTIAL_CHAR_WAIT: Duration = Duration::from_millis(200);

/// Number of leading bytes of `pending` that can be decoded now.
///
/// A multi-byte sequence cut off at the end is held back unless `flush_tail`
/// is set, in which case it is handed out and decoded lossily.
fn decodable_len(pending: &[u8], flush_tail: bool) -> usize {
    match std::str::from_utf8(pending) {
        Err(e) if e.error_len().is_none() && !flush_tail => e.valid_up_to(),
        _ => pending.len(),
    }
}

/// Answers every keyboard-interactive prompt with the password
struct PasswordPrompter<'a> {
    password: &'a str,
}

impl KeyboardInteractivePrompt for PasswordPrompter<'_> {
    fn prompt<'b>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[Prompt<'b>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.to_string()).collect()
    }
}

/// Opens password-authenticated interactive shells
#[derive(Debug, Default, Clone)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }

    fn open_tcp(target: &ConnectTarget) -> Result<TcpStream, ConnectError> {
        let unreachable = |reason: String| ConnectError::Unreachable {
            host: target.host.clone(),
            port: target.port,
            reason,
        };

        let addrs = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|e| unreachable(e.to_string()))?;

        let mut last_error = "no address resolved".to_string();
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, target.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(unreachable(last_error))
    }

    fn authenticate(session: &Session, target: &ConnectTarget) -> Result<(), ConnectError> {
        let methods = session
            .auth_methods(&target.username)
            .map(|m| m.to_string())
            .unwrap_or_default();
        debug!("Server offers auth methods: {}", methods);

        if let Err(e) = session.userauth_password(&target.username, &target.password) {
            debug!("Password auth failed: {}", e);
            if methods.contains("keyboard-interactive") {
                let mut prompter = PasswordPrompter {
                    password: &target.password,
                };
                if let Err(e) =
                    session.userauth_keyboard_interactive(&target.username, &mut prompter)
                {
                    debug!("Keyboard-interactive auth failed: {}", e);
                }
            }
        }

        if session.authenticated() {
            Ok(())
        } else {
            Err(ConnectError::AuthRejected {
                user: target.username.clone(),
            })
        }
    }
}

impl Connector for SshConnector {
    fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Transport>, ConnectError> {
        info!(
            "Connecting to {}@{}:{}",
            target.username, target.host, target.port
        );

        let tcp = Self::open_tcp(target)?;
        let mut session = Session::new().map_err(|e| ConnectError::Channel(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(target.timeout.as_millis() as u32);
        session.handshake().map_err(|e| ConnectError::Unreachable {
            host: target.host.clone(),
            port: target.port,
            reason: format!("handshake failed: {}", e),
        })?;

        Self::authenticate(&session, target)?;
        session.set_keepalive(true, KEEPALIVE_SECS);

        let mut channel = session
            .channel_session()
            .map_err(|e| ConnectError::Channel(e.to_string()))?;
        channel
            .request_pty("xterm", None, None)
            .map_err(|e| ConnectError::Channel(e.to_string()))?;
        channel
            .shell()
            .map_err(|e| ConnectError::Channel(e.to_string()))?;

        session.set_timeout(0);
        session.set_blocking(false);
        info!("Shell channel open on {}", target.host);

        Ok(Box::new(SshTransport {
            session,
            channel,
            pending: Vec::new(),
            partial_since: None,
            open: true,
        }))
    }
}

/// Interactive shell channel over SSH
pub struct SshTransport {
    session: Session,
    channel: Channel,
    /// Bytes read from the channel but not yet handed out
    pending: Vec<u8>,
    /// When `pending` started ending in an incomplete character
    partial_since: Option<Instant>,
    open: bool,
}

impl SshTransport {
    /// Pull whatever the channel has into `pending` without blocking
    fn fill(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }

        let mut buf = [0u8; 8192];
        loop {
            match self.channel.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Channel read failed: {}", e);
                    return Err(TransportError::Io(e));
                }
            }
        }

        if self.channel.eof() && self.pending.is_empty() {
            self.open = false;
            return Err(TransportError::Closed);
        }

        Ok(())
    }

    /// Bytes of `pending` ready to hand out. A split multi-byte sequence
    /// is kept for the next read until it completes or waits too long.
    fn ready_len(&mut self) -> usize {
        let whole = decodable_len(&self.pending, false);
        if whole == self.pending.len() {
            self.partial_since = None;
            return whole;
        }

        let since = *self.partial_since.get_or_insert_with(Instant::now);
        if self.channel.eof() || since.elapsed() >= PARTIAL_CHAR_WAIT {
            debug!("Passing on {} undecodable trailing bytes", self.pending.len() - whole);
            self.partial_since = None;
            return decodable_len(&self.pending, true);
        }
        whole
    }

    fn take_text(&mut self) -> String {
        let ready = self.ready_len();
        let bytes: Vec<u8> = self.pending.drain(..ready).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), TransportError> {
        let deadline = Instant::now() + WRITE_TIMEOUT;
        while !bytes.is_empty() {
            match self.channel.write(bytes) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => bytes = &bytes[n..],
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Ssh("write timed out".to_string()));
                    }
                    std::thread::sleep(super::EXPECT_POLL_INTERVAL);
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(())
    }
}

impl Transport for SshTransport {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        debug!("-> {}", line);
        self.write_all(format!("{}\n", line).as_bytes())?;
        self.flush()
    }

    fn data_available(&mut self) -> Result<bool, TransportError> {
        self.fill()?;
        Ok(self.ready_len() > 0)
    }

    fn read(&mut self) -> Result<String, TransportError> {
        self.fill()?;
        Ok(self.take_text())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        loop {
            match self.channel.flush() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(super::EXPECT_POLL_INTERVAL);
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open && !self.channel.eof()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        self.session.set_blocking(true);
        self.session.set_timeout(2000);
        if let Err(e) = self.channel.close() {
            debug!("Channel close failed: {}", e);
        }
        if let Err(e) = self.session.disconnect(None, "session closed", None) {
            debug!("Disconnect failed: {}", e);
        }
        info!("SSH session closed");
        Ok(())
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
