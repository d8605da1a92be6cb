//! Interactive session management module
//!
//! This module provides the core components of a remote shell session:
//! connection lifecycle, single-flight command execution, output normalization
//! and command routing.

pub mod command_executor;
pub mod command_router;
pub mod input;
pub mod output;
pub mod prompt;
pub mod session_manager;
pub mod signal;

pub use command_executor::{CommandExecutor, CommandRequest, CommandResult, CommandStatus};
pub use command_router::{CommandRouter, InteractiveCommand};
pub use input::InputReader;
pub use output::{NormalizedOutput, PromptMatch, PromptMatcher};
pub use prompt::{ConsolePrompter, Prompter, ScriptedPrompter};
pub use session_manager::SessionManager;
pub use signal::{CancelToken, ShutdownSignal};

use std::path::PathBuf;

use crate::transfer::RemoteEndpoint;

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Authenticating,
    Connected,
    Failed,
}

/// Login secret; never printed
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Everything known about the connected host
#[derive(Debug, Clone)]
pub struct Session {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    pub state: ConnectionState,
    /// Working directory confirmed by the last directory query
    pub remote_directory: Option<String>,
    /// Last shell prompt token seen
    pub prompt: Option<String>,
    /// Directory shown in the fallback prompt, set at bootstrap
    pub prompt_directory: Option<String>,
    /// The last response ended in a question instead of a prompt
    pub question_pending: bool,
    /// Local workspace for transfers
    pub local_path: PathBuf,
    /// Remote directory used by `publish` and `refresh`
    pub remote_path: String,
    /// Environment label, e.g. `prod`
    pub environment: String,
    /// Host history id once saved
    pub host_id: Option<String>,
    /// Name shown to the user; the static hostname when known
    pub display_name: String,
}

impl Session {
    pub fn new(host: &str, port: u16, username: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            credential: Credential::default(),
            state: ConnectionState::Disconnected,
            remote_directory: None,
            prompt: None,
            prompt_directory: None,
            question_pending: false,
            local_path: PathBuf::new(),
            remote_path: "/".to_string(),
            environment: String::new(),
            host_id: None,
            display_name: host.to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Text shown before each input line
    pub fn prompt_label(&self) -> String {
        if let Some(prompt) = &self.prompt {
            return format!("{} ", prompt);
        }

        let short_host = self.display_name.split('.').next().unwrap_or(&self.display_name);
        let directory = self
            .prompt_directory
            .as_deref()
            .or(self.remote_directory.as_deref())
            .map(last_segment)
            .unwrap_or("~");
        format!("[{}@{} {}]$ ", self.username, short_host, directory)
    }

    /// Where file transfers go
    pub fn endpoint(&self) -> RemoteEndpoint {
        RemoteEndpoint {
            user: self.username.clone(),
            host: self.host.clone(),
            port: self.port,
            password: self.credential.expose().to_string(),
        }
    }
}

/// Last path segment; `/` stays `/`
pub fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_prompt_label() {
        let mut session = Session::new("web01.example.com", 22, "deploy");
        assert_eq!(session.prompt_label(), "[deploy@web01 ~]$ ");

        session.prompt_directory = Some("/var/www".to_string());
        assert_eq!(session.prompt_label(), "[deploy@web01 www]$ ");

        session.prompt = Some("deploy@web01:/var/www$".to_string());
        assert_eq!(session.prompt_label(), "deploy@web01:/var/www$ ");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("/etc/nginx/"), "nginx");
        assert_eq!(last_segment("/"), "/");
        assert_eq!(last_segment("/root"), "root");
    }

    #[test]
    fn test_credential_is_redacted() {
        let mut session = Session::new("db01", 22, "root");
        session.credential = Credential::new("hunter2");
        assert!(!format!("{:?}", session).contains("hunter2"));
        assert_eq!(session.endpoint().password, "hunter2");
    }
}
