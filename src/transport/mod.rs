//! Remote shell transport boundary
//!
//! The session core only needs a duplex text stream that can write a line,
//! report whether data is waiting, read what is buffered and wait for a regex.
//! `ssh` provides the production implementation, `mock` a scripted one.

pub mod mock;
pub mod ssh;

use regex::Regex;
use std::time::{Duration, Instant};

use crate::session::signal::CancelToken;

pub use mock::{MockConnector, MockTransport};
pub use ssh::{SshConnector, SshTransport};

/// Interval between polls while waiting for a pattern
pub const EXPECT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Error types for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel closed by remote host")]
    Closed,
    #[error("SSH error: {0}")]
    Ssh(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the channel itself is no longer usable
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Closed => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            TransportError::Ssh(_) => false,
        }
    }
}

/// Error types for establishing a session
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("host {host}:{port} is unreachable: {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("authentication rejected for user {user}")]
    AuthRejected { user: String },
    #[error("connection cancelled by user")]
    Cancelled,
    #[error("failed to open shell channel: {0}")]
    Channel(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectError {
    /// Whether re-prompting the credential may fix the problem
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ConnectError::AuthRejected { .. })
    }
}

/// Result of waiting for a pattern
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpectOutcome {
    /// Whether the pattern was seen before the deadline
    pub matched: bool,
    /// Everything read while waiting, matched or not
    pub buffer: String,
}

/// Everything needed to open a session against a host
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Interactive duplex text channel to a remote shell
pub trait Transport: Send {
    /// Write one command line, terminated with a newline
    fn write_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Whether unread data is waiting on the channel
    fn data_available(&mut self) -> Result<bool, TransportError>;

    /// Read everything currently buffered; never blocks for new data
    fn read(&mut self) -> Result<String, TransportError>;

    /// Flush pending writes
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Whether the channel is still usable
    fn is_open(&self) -> bool;

    /// Close the channel and the underlying connection
    fn close(&mut self) -> Result<(), TransportError>;

    /// Read until `pattern` appears in the accumulated text, `timeout`
    /// elapses, or `cancel` fires.
    fn expect(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ExpectOutcome, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut buffer = String::new();

        loop {
            let mut received = false;
            if self.data_available()? {
                let chunk = self.read()?;
                received = !chunk.is_empty();
                buffer.push_str(&chunk);
                if received && pattern.is_match(&buffer) {
                    return Ok(ExpectOutcome {
                        matched: true,
                        buffer,
                    });
                }
            }

            // The deadline holds even while data keeps arriving
            if cancel.is_cancelled() || Instant::now() >= deadline {
                return Ok(ExpectOutcome {
                    matched: false,
                    buffer,
                });
            }

            if received {
                continue;
            }

            if !self.is_open() {
                return Err(TransportError::Closed);
            }

            std::thread::sleep(EXPECT_POLL_INTERVAL);
        }
    }
}

/// Factory for transports; lets the session manager be driven by mocks
pub trait Connector: Send + Sync {
    /// Open an authenticated interactive shell channel
    fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Transport>, ConnectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(TransportError::Closed.is_fatal());
        assert!(
            TransportError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_fatal()
        );
        assert!(
            !TransportError::Io(std::io::Error::from(std::io::ErrorKind::WouldBlock)).is_fatal()
        );
        assert!(!TransportError::Ssh("timeout".to_string()).is_fatal());
    }

    #[test]
    fn test_auth_failure_classification() {
        let rejected = ConnectError::AuthRejected {
            user: "root".to_string(),
        };
        assert!(rejected.is_auth_failure());
        assert!(!ConnectError::Cancelled.is_auth_failure());
    }

    #[test]
    fn test_default_expect_times_out_with_partial_buffer() {
        let mut transport = MockTransport::builder()
            .respond("tail -f log", "line one\r\nline two\r\n")
            .build();
        transport.write_line("tail -f log").unwrap();

        let pattern = Regex::new(r"\[.*@.*\][$#]").unwrap();
        let outcome = transport
            .expect(&pattern, Duration::from_millis(50), &CancelToken::detached())
            .unwrap();

        assert!(!outcome.matched);
        assert!(outcome.buffer.contains("line two"));
    }

    #[test]
    fn test_default_expect_honours_cancel() {
        let mut transport = MockTransport::builder().build();
        let token = CancelToken::detached();
        token.cancel();

        let pattern = Regex::new("never").unwrap();
        let started = Instant::now();
        let outcome = transport
            .expect(&pattern, Duration::from_secs(5), &token)
            .unwrap();

        assert!(!outcome.matched);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    /// Always has more output waiting, like `yes`
    struct EndlessOutput {
        reads: usize,
    }

    impl Transport for EndlessOutput {
        fn write_line(&mut self, _line: &str) -> Result<(), TransportError> {
            Ok(())
        }

        fn data_available(&mut self) -> Result<bool, TransportError> {
            Ok(true)
        }

        fn read(&mut self) -> Result<String, TransportError> {
            self.reads += 1;
            Ok("y\n".to_string())
        }

        fn flush(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_expect_times_out_while_data_keeps_arriving() {
        let mut transport = EndlessOutput { reads: 0 };
        let pattern = Regex::new(r"\$ $").unwrap();

        let started = Instant::now();
        let outcome = transport
            .expect(&pattern, Duration::from_millis(100), &CancelToken::detached())
            .unwrap();

        assert!(!outcome.matched);
        assert!(outcome.buffer.starts_with("y\ny\n"));
        assert!(transport.reads > 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
