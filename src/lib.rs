//! Linux Commander Library
//!
//! An interactive remote command console that drives one SSH shell channel,
//! detects command completion from the shell prompt, and rewrites user
//! shorthands into full commands.

pub mod cli;
pub mod config;
pub mod session;
pub mod store;
pub mod transfer;
pub mod translation;
pub mod transport;
pub mod ui;

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// Application result type for consistent error handling
pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initialize tracing subscriber for logging.
///
/// Log lines go to `file_path` so they never mix with the remote output on
/// the terminal. Keep the returned guard alive until exit.
pub fn init_logging(level: &str, file_path: &str) -> Result<WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let path = Path::new(file_path);
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path '{}' has no file name", file_path))?;

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("linux_commander={}", level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .try_init()
        .context("Logging was already initialized")?;

    Ok(guard)
}
