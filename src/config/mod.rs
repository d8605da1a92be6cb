//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Bounds applied to the connection timeout
pub const MIN_CONNECTION_TIMEOUT_SECS: u64 = 5;
pub const MAX_CONNECTION_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Logging level
    pub log_level: String,

    /// Editor used by `edit` and `edit-config`
    pub editor: String,

    /// Default local working folder for transfers
    pub local_path: String,

    /// File-based logging configuration
    pub log: LogConfig,

    /// SSH connection settings
    pub connection: ConnectionConfig,

    /// Remote command execution settings
    pub command: CommandConfig,

    /// File transfer settings
    pub transfer: TransferConfig,

    /// Listing and prompt colours
    pub colors: ColorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// TCP connect and handshake timeout in seconds, clamped to 5..=60
    pub timeout_secs: u64,

    /// Password prompts before giving up
    pub max_auth_attempts: u32,

    /// Port used when the host carries none
    pub default_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Time allowed for a command to return to the prompt
    pub timeout_secs: u64,

    /// Minimum time a command result is held back
    pub min_wait_secs: u64,

    /// Extra time granted to the worker before it is cancelled
    pub grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Copy tool, `scp` or `pscp`
    pub program: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ColorConfig {
    pub directory: String,
    pub sticky: String,
    pub full_permissions_fg: String,
    pub full_permissions_bg: String,
    pub block_device: String,
    pub char_device: String,
    pub symlink: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Absolute or relative path to the log file
    pub file_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            editor: default_editor(),
            local_path: "data/workspace".to_string(),
            log: LogConfig::default(),
            connection: ConnectionConfig::default(),
            command: CommandConfig::default(),
            transfer: TransferConfig::default(),
            colors: ColorConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_auth_attempts: 3,
            default_port: 22,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            min_wait_secs: 0,
            grace_ms: 500,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            program: "scp".to_string(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            directory: "green".to_string(),
            sticky: "cyan".to_string(),
            full_permissions_fg: "white".to_string(),
            full_permissions_bg: "red".to_string(),
            block_device: "yellow".to_string(),
            char_device: "magenta".to_string(),
            symlink: "bright yellow".to_string(),
            prompt: "green".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: "logs/linux-commander.log".to_string(),
        }
    }
}

impl ColorConfig {
    /// Every configured colour with its setting name
    pub fn entries(&self) -> [(&'static str, &str); 8] {
        [
            ("directory", &self.directory),
            ("sticky", &self.sticky),
            ("full_permissions_fg", &self.full_permissions_fg),
            ("full_permissions_bg", &self.full_permissions_bg),
            ("block_device", &self.block_device),
            ("char_device", &self.char_device),
            ("symlink", &self.symlink),
            ("prompt", &self.prompt),
        ]
    }
}

fn default_editor() -> String {
    env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| {
            if cfg!(windows) {
                "notepad.exe".to_string()
            } else {
                "vi".to_string()
            }
        })
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // LCMD_LOG_LEVEL - logging level
        if let Ok(log_level) = env::var("LCMD_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // LCMD_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("LCMD_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = file_path;
            }
        }

        // LCMD_EDITOR - text editor
        if let Ok(editor) = env::var("LCMD_EDITOR") {
            if !editor.trim().is_empty() {
                self.editor = editor;
            }
        }

        // LCMD_LOCAL_PATH - local working folder
        if let Ok(local_path) = env::var("LCMD_LOCAL_PATH") {
            if !local_path.trim().is_empty() {
                self.local_path = local_path;
            }
        }

        // Connection-specific environment variables
        // LCMD_CONNECTION_TIMEOUT_SECS - connect timeout
        if let Ok(timeout) = env::var("LCMD_CONNECTION_TIMEOUT_SECS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.connection.timeout_secs = value;
            }
        }

        // LCMD_CONNECTION_MAX_AUTH_ATTEMPTS - password attempts
        if let Ok(attempts) = env::var("LCMD_CONNECTION_MAX_AUTH_ATTEMPTS") {
            if let Ok(value) = attempts.parse::<u32>() {
                self.connection.max_auth_attempts = value;
            }
        }

        // LCMD_CONNECTION_DEFAULT_PORT - default SSH port
        if let Ok(port) = env::var("LCMD_CONNECTION_DEFAULT_PORT") {
            if let Ok(value) = port.parse::<u16>() {
                self.connection.default_port = value;
            }
        }

        // Command-specific environment variables
        // LCMD_COMMAND_TIMEOUT_SECS - command timeout
        if let Ok(timeout) = env::var("LCMD_COMMAND_TIMEOUT_SECS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.command.timeout_secs = value;
            }
        }

        // LCMD_COMMAND_MIN_WAIT_SECS - minimum wait
        if let Ok(min_wait) = env::var("LCMD_COMMAND_MIN_WAIT_SECS") {
            if let Ok(value) = min_wait.parse::<u64>() {
                self.command.min_wait_secs = value;
            }
        }

        // LCMD_COMMAND_GRACE_MS - worker grace period
        if let Ok(grace) = env::var("LCMD_COMMAND_GRACE_MS") {
            if let Ok(value) = grace.parse::<u64>() {
                self.command.grace_ms = value;
            }
        }

        // LCMD_TRANSFER_PROGRAM - copy tool
        if let Ok(program) = env::var("LCMD_TRANSFER_PROGRAM") {
            if !program.trim().is_empty() {
                self.transfer.program = program;
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {}, using defaults", err);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.connection.max_auth_attempts == 0 {
            anyhow::bail!("connection.max_auth_attempts must be greater than 0");
        }

        if self.connection.default_port == 0 {
            anyhow::bail!("connection.default_port must be greater than 0");
        }

        if self.command.timeout_secs == 0 {
            anyhow::bail!("command.timeout_secs must be greater than 0");
        }

        if self.editor.trim().is_empty() {
            anyhow::bail!("Editor must not be empty");
        }

        if self.transfer.program.trim().is_empty() {
            anyhow::bail!("transfer.program must not be empty");
        }

        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        for (name, value) in self.colors.entries() {
            if value.parse::<colored::Color>().is_err() {
                anyhow::bail!("Unknown colour for colors.{}: {}", name, value);
            }
        }

        Ok(())
    }

    /// Connection timeout, clamped to the supported range
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connection
                .timeout_secs
                .clamp(MIN_CONNECTION_TIMEOUT_SECS, MAX_CONNECTION_TIMEOUT_SECS),
        )
    }

    /// Default command timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command.timeout_secs)
    }

    /// Default minimum wait
    pub fn command_min_wait(&self) -> Duration {
        Duration::from_secs(self.command.min_wait_secs)
    }

    /// Grace period before a late worker is cancelled
    pub fn command_grace(&self) -> Duration {
        Duration::from_millis(self.command.grace_ms)
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(self)?);
        Ok(())
    }

    /// Handle configuration command
    pub fn handle_command(action: &Option<crate::cli::ConfigAction>, path: &str) -> Result<()> {
        match action {
            Some(crate::cli::ConfigAction::Show) | None => {
                let config = Config::load_or_default(path);
                config.display()?;
            }
            Some(crate::cli::ConfigAction::Reset) => {
                let default_config = Config::default();
                default_config.save_to_file(path)?;
                println!("Default configuration written to {}", path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.max_auth_attempts, 3);
        assert_eq!(config.command_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_connection_timeout_is_clamped() {
        let mut config = Config::default();

        config.connection.timeout_secs = 1;
        assert_eq!(config.connection_timeout(), Duration::from_secs(5));

        config.connection.timeout_secs = 600;
        assert_eq!(config.connection_timeout(), Duration::from_secs(60));

        config.connection.timeout_secs = 20;
        assert_eq!(config.connection_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[command]\ntimeout_secs = 30\n").unwrap();
        assert_eq!(config.command.timeout_secs, 30);
        assert_eq!(config.command.grace_ms, 500);
        assert_eq!(config.transfer.program, "scp");
    }

    #[test]
    fn test_unknown_colour_is_rejected() {
        let mut config = Config::default();
        config.colors.sticky = "chartreuse-ish".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.editor = "nano".to_string();
        let temp_file = NamedTempFile::new().unwrap();

        // Test save
        config.save_to_file(temp_file.path()).unwrap();

        // Test load
        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.colors.directory, "green");
        assert_eq!(loaded_config.connection.default_port, 22);
    }
}
