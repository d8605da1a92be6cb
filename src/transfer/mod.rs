//! File transfer through an external copy tool
//!
//! Files and folders move between the local workspace and the remote host by
//! running `scp` (or PuTTY's `pscp`) as a subprocess. Copies are recursive and
//! preserve modification times.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info};

/// Error types for file transfers
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("copy tool '{program}' was not found")]
    ToolMissing { program: String },
    #[error("'{program}' exited with status {status}")]
    Failed { program: String, status: i32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// What the user can do about it
    pub fn remediation(&self) -> Option<String> {
        match self {
            TransferError::ToolMissing { program } => Some(format!(
                "'{}' is required to pull or publish files. Install it (OpenSSH client or PuTTY) \
                 and make sure it is on PATH, or set transfer.program in the configuration.",
                program
            )),
            _ => None,
        }
    }
}

/// Which way a copy goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// Where and as whom the remote side is reached
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl RemoteEndpoint {
    /// `user@host:path` as understood by scp
    pub fn target(&self, path: &str) -> String {
        format!("{}@{}:{}", self.user, self.host, path)
    }
}

/// Moves files between the local machine and the remote host
pub trait FileTransfer: Send + Sync {
    fn copy(
        &self,
        endpoint: &RemoteEndpoint,
        local: &Path,
        remote: &str,
        direction: Direction,
    ) -> Result<(), TransferError>;
}

/// Runs `scp` or `pscp`
#[derive(Debug, Clone)]
pub struct ScpTransfer {
    program: String,
}

impl ScpTransfer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn is_pscp(&self) -> bool {
        Path::new(&self.program)
            .file_stem()
            .map(|stem| stem.to_string_lossy().eq_ignore_ascii_case("pscp"))
            .unwrap_or(false)
    }

    /// Arguments for one copy; `pscp` receives the password on the command line
    pub fn build_args(
        &self,
        endpoint: &RemoteEndpoint,
        local: &Path,
        remote: &str,
        direction: Direction,
    ) -> Vec<String> {
        let mut args = vec!["-r".to_string(), "-p".to_string()];
        if self.is_pscp() {
            args.push("-pw".to_string());
            args.push(endpoint.password.clone());
        }
        args.push("-P".to_string());
        args.push(endpoint.port.to_string());

        let local = local.display().to_string();
        let remote = endpoint.target(remote);
        match direction {
            Direction::Upload => {
                args.push(local);
                args.push(remote);
            }
            Direction::Download => {
                args.push(remote);
                args.push(local);
            }
        }
        args
    }
}

impl FileTransfer for ScpTransfer {
    fn copy(
        &self,
        endpoint: &RemoteEndpoint,
        local: &Path,
        remote: &str,
        direction: Direction,
    ) -> Result<(), TransferError> {
        let args = self.build_args(endpoint, local, remote, direction);
        debug!("Running {} for {:?} of {}", self.program, direction, local.display());

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::inherit())
            .status()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TransferError::ToolMissing {
                    program: self.program.clone(),
                },
                _ => TransferError::Io(e),
            })?;

        if !status.success() {
            return Err(TransferError::Failed {
                program: self.program.clone(),
                status: status.code().unwrap_or(-1),
            });
        }

        info!("{:?} of {} finished", direction, local.display());
        Ok(())
    }
}

/// A copy seen by [`RecordingTransfer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCopy {
    pub local: PathBuf,
    pub remote: String,
    pub direction: Direction,
}

/// Records copies instead of running a tool; for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingTransfer {
    copies: Mutex<Vec<RecordedCopy>>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copies(&self) -> Vec<RecordedCopy> {
        self.copies.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl FileTransfer for RecordingTransfer {
    fn copy(
        &self,
        _endpoint: &RemoteEndpoint,
        local: &Path,
        remote: &str,
        direction: Direction,
    ) -> Result<(), TransferError> {
        if let Ok(mut copies) = self.copies.lock() {
            copies.push(RecordedCopy {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                direction,
            });
        }
        Ok(())
    }
}
