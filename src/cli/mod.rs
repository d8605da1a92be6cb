//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for Linux Commander.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "linux-commander")]
#[command(about = "Interactive remote command console over SSH")]
#[command(
    long_about = "Drives a single interactive SSH shell, detects command completion from the shell prompt and translates user shorthands into full commands"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Remote host, optionally as HOST:PORT
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Remote user name
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password; prompted with masked input when omitted
    #[arg(short, long)]
    pub password: Option<String>,

    /// SSH port, used when the host carries none
    #[arg(long)]
    pub port: Option<u16>,

    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Table store holding translations and host history
    #[arg(long, default_value = "data/linux-commander.json")]
    pub data_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Dry-run mode: show configuration and translation rules without connecting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive session
    #[command(hide = true)]
    Interactive,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Interactive
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration to the config file
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the actual command, using default if none provided
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }

    /// Adjust log level based on verbose flag
    pub fn effective_log_level(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }

    /// Check if we're running in dry-run mode
    pub fn is_dry_run_mode(&self) -> bool {
        self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["linux-commander"]);
        assert_eq!(cli.config_file, "config.toml");
        assert_eq!(cli.data_file, "data/linux-commander.json");
        assert!(matches!(cli.command(), Commands::Interactive));
        assert_eq!(cli.effective_log_level(), "info");
    }

    #[test]
    fn test_connection_flags() {
        let cli = Cli::parse_from([
            "linux-commander",
            "-H",
            "10.0.0.5:2222",
            "-u",
            "deploy",
            "-v",
            "--dry-run",
        ]);
        assert_eq!(cli.host.as_deref(), Some("10.0.0.5:2222"));
        assert_eq!(cli.user.as_deref(), Some("deploy"));
        assert_eq!(cli.effective_log_level(), "debug");
        assert!(cli.is_dry_run_mode());
    }

    #[test]
    fn test_config_subcommand() {
        let cli = Cli::parse_from(["linux-commander", "config", "reset"]);
        assert!(matches!(
            cli.command(),
            Commands::Config {
                action: Some(ConfigAction::Reset)
            }
        ));
    }
}
