//! Session Manager for the remote shell connection lifecycle
//!
//! Resolves which host to talk to, authenticates with retries, bootstraps the
//! prompt and working directory, and owns the [`CommandExecutor`] of the live
//! channel.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::store::{HostRecord, StoreError, TableStore};
use crate::transfer::{FileTransfer, ScpTransfer};
use crate::transport::{ConnectError, ConnectTarget, Connector, SshConnector, Transport};
use crate::ui::{ConsoleRenderer, Renderer, SemanticColor, cli as screens, console::ColorScheme};

use super::command_executor::{CommandExecutor, CommandRequest, CommandResult};
use super::prompt::{ConsolePrompter, Prompter};
use super::signal::ShutdownSignal;
use super::{ConnectionState, Credential, Session, last_segment};

/// How long a host gets to accept a TCP connection before it counts as unreachable
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A bootstrap reply longer than this is a banner, so the query is repeated
const BANNER_REPLY_LEN: usize = 50;

/// Longest directory accepted from the bootstrap query
const MAX_BOOTSTRAP_DIR_LEN: usize = 40;

/// Most path segments accepted from the bootstrap query
const MAX_BOOTSTRAP_DIR_SEGMENTS: usize = 3;

/// Split `HOST[:PORT]`
pub fn split_host_port(input: &str, default_port: u16) -> Result<(String, u16)> {
    let input = input.trim();
    let (host, port) = match input.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) if port > 0 => (host, port),
            _ => bail!("'{}' is not a valid port", port),
        },
        None => (input, default_port),
    };

    if host.is_empty() {
        bail!("Host name is empty");
    }
    Ok((host.to_string(), port))
}

/// Directory from the bootstrap `pwd -P` reply, when it is a short absolute path
pub fn parse_bootstrap_directory(reply: &str) -> Option<String> {
    let reply = reply.trim();
    if !reply.starts_with('/') || reply.contains('\n') {
        return None;
    }

    let segments = reply.split('/').filter(|s| !s.is_empty()).count();
    if reply.chars().count() >= MAX_BOOTSTRAP_DIR_LEN || segments > MAX_BOOTSTRAP_DIR_SEGMENTS {
        return None;
    }
    Some(reply.to_string())
}

/// Outcome of the host menu
enum MenuChoice {
    Selected(HostRecord),
    Quit,
}

/// Main session manager for the remote shell
pub struct SessionManager {
    /// Application configuration
    config: Config,
    /// Where the configuration was loaded from
    config_file: String,
    /// Translations and host history
    store: TableStore,
    /// Connection details and shell state
    session: Session,
    /// Present while a channel is open
    executor: Option<CommandExecutor>,
    renderer: Arc<dyn Renderer>,
    transfer: Arc<dyn FileTransfer>,
    prompter: Box<dyn Prompter>,
    connector: Arc<dyn Connector>,
    shutdown: ShutdownSignal,
    /// Whether hosts are probed before use
    probe_hosts: bool,
}

impl SessionManager {
    /// Create a new SessionManager with terminal prompts and an SSH connector
    pub fn new(config: Config, config_file: &str, store: TableStore, shutdown: ShutdownSignal) -> Self {
        info!("Creating new SessionManager");

        let renderer = Arc::new(ConsoleRenderer::new(ColorScheme::from_config(&config.colors)));
        let transfer = Arc::new(ScpTransfer::new(config.transfer.program.clone()));
        let session = Session::new("", config.connection.default_port, "");

        let mut manager = Self {
            config,
            config_file: config_file.to_string(),
            store,
            session,
            executor: None,
            renderer,
            transfer,
            prompter: Box::new(ConsolePrompter::new()),
            connector: Arc::new(SshConnector::new()),
            shutdown,
            probe_hosts: true,
        };
        manager.session.local_path = manager.default_local_path();
        manager
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_transfer(mut self, transfer: Arc<dyn FileTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Skip the reachability probe; hosts are then always treated as reachable
    pub fn without_probe(mut self) -> Self {
        self.probe_hosts = false;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn renderer(&self) -> Arc<dyn Renderer> {
        self.renderer.clone()
    }

    pub fn transfer(&self) -> Arc<dyn FileTransfer> {
        self.transfer.clone()
    }

    pub fn prompter(&mut self) -> &mut dyn Prompter {
        self.prompter.as_mut()
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Workspace used when a host has no local path of its own
    pub fn default_local_path(&self) -> PathBuf {
        PathBuf::from(&self.config.local_path)
    }

    fn emit(&self, text: &str, color: SemanticColor) {
        self.renderer.emit(text, color, true);
    }

    /// Pick the target from the command line, or from the host menu.
    /// Returns `false` when the user quit instead of choosing a host.
    pub async fn initialize(&mut self, cli: &Cli) -> Result<bool> {
        info!("Initializing session");

        if let Some(password) = &cli.password {
            self.session.credential = Credential::new(password.clone());
        }

        let Some(host) = &cli.host else {
            return self.choose_host().await;
        };

        let default_port = cli.port.unwrap_or(self.config.connection.default_port);
        let (host_name, port) = split_host_port(host, default_port)?;
        let user = match &cli.user {
            Some(user) => user.clone(),
            None => match self.prompter.read_line("-= [ Username ]=- :  ")? {
                Some(user) if !user.trim().is_empty() => user.trim().to_string(),
                _ => return Ok(false),
            },
        };

        let history_name = self.history_name(&host_name, port);
        let record = self
            .store
            .hosts()
            .iter()
            .find(|h| h.host_name.eq_ignore_ascii_case(&history_name) && h.user_name == user)
            .cloned()
            .unwrap_or_else(|| HostRecord::new(&history_name, &user));

        let credential = std::mem::take(&mut self.session.credential);
        self.apply_record(&record)?;
        self.session.credential = credential;
        Ok(true)
    }

    /// Show the host menu and load the chosen host.
    /// Returns `false` when the user quit.
    pub async fn choose_host(&mut self) -> Result<bool> {
        let record = if self.store.hosts().is_empty() {
            match self.prompt_new_host().await? {
                Some(record) => record,
                None => return Ok(false),
            }
        } else {
            match self.host_menu().await? {
                MenuChoice::Selected(record) => record,
                MenuChoice::Quit => return Ok(false),
            }
        };

        self.apply_record(&record)?;
        Ok(true)
    }

    async fn host_menu(&mut self) -> Result<MenuChoice> {
        loop {
            let mut entries = Vec::new();
            for record in self.store.hosts().to_vec() {
                let reachable = self.probe_record(&record).await;
                entries.push((record, reachable));
            }
            screens::show_host_menu(self.renderer.as_ref(), &entries);

            loop {
                let Some(answer) = self.prompter.read_line("Selection: ")? else {
                    return Ok(MenuChoice::Quit);
                };
                let answer = answer.trim().to_lowercase();
                let mut words = answer.split_whitespace();

                match (words.next(), words.next()) {
                    (None, _) => continue,
                    (Some("q"), _) => return Ok(MenuChoice::Quit),
                    (Some("r"), _) => break,
                    (Some("n"), _) => {
                        if let Some(record) = self.prompt_new_host().await? {
                            return Ok(MenuChoice::Selected(record));
                        }
                        break;
                    }
                    (Some("d"), id) => {
                        let id = match id {
                            Some(id) => id.to_string(),
                            None => self.prompter.read_line("Host id to delete: ")?.unwrap_or_default(),
                        };
                        match self.store.delete_host(id.trim()) {
                            Ok(true) => self.emit(&format!("Host [{}] deleted.", id.trim()), SemanticColor::Success),
                            Ok(false) => self.emit(&format!("[ {} ] not found.", id.trim()), SemanticColor::Error),
                            Err(e) => self.emit(&e.to_string(), SemanticColor::Error),
                        }
                        break;
                    }
                    (Some(id), _) => match entries.iter().find(|(h, _)| h.host_id == id) {
                        Some((record, true)) => return Ok(MenuChoice::Selected(record.clone())),
                        Some((_, false)) => self.emit(
                            &format!("[ {} ] is unreachable. Try a reachable host.", id),
                            SemanticColor::Error,
                        ),
                        None => self.emit(&format!("[ {} ] not found. Try again.", id), SemanticColor::Error),
                    },
                }
            }
        }
    }

    /// Ask for a new host until it is reachable; `None` when the user gives up
    async fn prompt_new_host(&mut self) -> Result<Option<HostRecord>> {
        let default_port = self.config.connection.default_port;

        let (host_name, port) = loop {
            let Some(input) = self.prompter.read_line("-= [ HostInfo ]=- :  ")? else {
                return Ok(None);
            };
            if input.trim().is_empty() {
                return Ok(None);
            }

            let (host_name, port) = match split_host_port(&input, default_port) {
                Ok(parts) => parts,
                Err(e) => {
                    self.emit(&e.to_string(), SemanticColor::Error);
                    continue;
                }
            };

            if self.probe(&host_name, port).await {
                break (host_name, port);
            }
            self.emit(
                &format!(
                    "Failed to connect to host. Port is currently set to {}.\n If this port is incorrect try <HOST_NAME>:<PORT>",
                    port
                ),
                SemanticColor::Error,
            );
        };

        let environment = self
            .prompter
            .read_line("-= [ Env Name ]=- (Enter to skip):  ")?
            .unwrap_or_default();

        let user = loop {
            match self.prompter.read_line("-= [ Username ]=- :  ")? {
                Some(user) if !user.trim().is_empty() => break user.trim().to_string(),
                Some(_) => continue,
                None => return Ok(None),
            }
        };

        let mut record = HostRecord::new(&self.history_name(&host_name, port), &user);
        record.environment = environment.trim().to_string();
        Ok(Some(record))
    }

    /// Host name as kept in history: the port is only written when it is not the default
    fn history_name(&self, host: &str, port: u16) -> String {
        if port == self.config.connection.default_port {
            host.to_string()
        } else {
            format!("{}:{}", host, port)
        }
    }

    fn apply_record(&mut self, record: &HostRecord) -> Result<()> {
        let (host, port) = split_host_port(&record.host_name, self.config.connection.default_port)?;

        let mut session = Session::new(&host, port, &record.user_name);
        session.environment = record.environment.clone();
        session.host_id = Some(record.host_id.clone()).filter(|id| !id.is_empty());
        session.local_path = if record.local_path.trim().is_empty() {
            self.default_local_path()
        } else {
            PathBuf::from(record.local_path.trim())
        };
        if !record.remote_path.trim().is_empty() {
            session.remote_path = record.remote_path.trim().to_string();
        }

        if let Err(e) = std::fs::create_dir_all(&session.local_path) {
            warn!("Cannot create local path {}: {}", session.local_path.display(), e);
        }

        debug!("Target is {}@{}:{}", session.username, session.host, session.port);
        self.session = session;
        Ok(())
    }

    async fn probe_record(&self, record: &HostRecord) -> bool {
        match split_host_port(&record.host_name, self.config.connection.default_port) {
            Ok((host, port)) => self.probe(&host, port).await,
            Err(_) => false,
        }
    }

    /// Whether the host accepts a TCP connection within [`PROBE_TIMEOUT`]
    async fn probe(&self, host: &str, port: u16) -> bool {
        if !self.probe_hosts {
            return true;
        }

        let reachable = matches!(
            tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        );
        debug!("Probe {}:{} reachable={}", host, port, reachable);
        reachable
    }

    /// Ask for the password; on caps lock warn and ask once more
    fn prompt_credential(&mut self) -> Result<Option<Credential>, ConnectError> {
        let label = "-= [ Password ]=- :  ";
        let to_io = |e: anyhow::Error| ConnectError::Io(std::io::Error::other(e.to_string()));

        let Some(secret) = self.prompter.read_secret(label).map_err(to_io)? else {
            return Ok(None);
        };
        if !secret.caps_lock {
            return Ok(Some(Credential::new(secret.value)).filter(|c| !c.is_empty()));
        }

        self.emit("## CapsLock was ON ##", SemanticColor::Error);
        let retry = self.prompter.read_secret(label).map_err(to_io)?;
        Ok(retry
            .map(|secret| Credential::new(secret.value))
            .filter(|c| !c.is_empty()))
    }

    /// Open the channel, authenticate and bootstrap the shell
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        let max_attempts = self.config.connection.max_auth_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if self.session.credential.is_empty() {
                match self.prompt_credential()? {
                    Some(credential) => self.session.credential = credential,
                    None => return Err(self.fail(ConnectError::Cancelled)),
                }
            }

            self.session.state = ConnectionState::Authenticating;
            info!(
                "Connecting to {}@{}:{} (attempt {}/{})",
                self.session.username, self.session.host, self.session.port, attempt, max_attempts
            );

            let target = ConnectTarget {
                host: self.session.host.clone(),
                port: self.session.port,
                username: self.session.username.clone(),
                password: self.session.credential.expose().to_string(),
                timeout: self.config.connection_timeout(),
            };
            let connector = self.connector.clone();
            let connected = tokio::task::spawn_blocking(move || connector.connect(&target))
                .await
                .unwrap_or_else(|e| Err(ConnectError::Channel(e.to_string())));

            match connected {
                Ok(transport) => {
                    self.start(transport).await;
                    return Ok(());
                }
                Err(e) if e.is_auth_failure() && attempt < max_attempts => {
                    warn!("Authentication failed ({}/{})", attempt, max_attempts);
                    self.emit(
                        &format!("Access denied ({}/{}). Try again.", attempt, max_attempts),
                        SemanticColor::Error,
                    );
                    self.session.credential = Credential::default();
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn fail(&mut self, error: ConnectError) -> ConnectError {
        warn!("Connection failed: {}", error);
        self.session.state = ConnectionState::Failed;
        self.session.credential = Credential::default();
        self.emit(&format!("Connection failed: {}", error), SemanticColor::Error);
        self.shutdown.trigger("connection failed");
        error
    }

    async fn start(&mut self, transport: Box<dyn Transport>) {
        let executor = CommandExecutor::new(transport, self.renderer.clone(), self.shutdown.clone())
            .with_defaults(
                self.config.command_timeout(),
                self.config.command_min_wait(),
                self.config.command_grace(),
            );
        self.executor = Some(executor);

        self.bootstrap().await;

        self.session.state = ConnectionState::Connected;
        info!("Connected to {}", self.session.host);
        self.save_history();

        self.renderer.emit("Local Path has been set to: ", SemanticColor::Info, false);
        self.emit(&self.session.local_path.display().to_string(), SemanticColor::Value);
        self.renderer.emit("Remote Path has been set to: ", SemanticColor::Info, false);
        self.emit(&self.session.remote_path.clone(), SemanticColor::Value);
    }

    /// Seed prompt directory and working directory from a silent `pwd -P`
    async fn bootstrap(&mut self) {
        let configured_remote = self.session.remote_path.len() > 1;

        let mut reply = self.run_silent("pwd -P").await;
        if reply.output.chars().count() > BANNER_REPLY_LEN {
            debug!("Bootstrap reply looks like a banner, asking again");
            reply = self.run_silent("pwd -P").await;
        }

        if !reply.success {
            debug!("Bootstrap query did not complete: {:?}", reply.status);
        } else if let Some(directory) = parse_bootstrap_directory(&reply.output) {
            self.session.prompt_directory = Some(last_segment(&directory).to_string());
            self.session.remote_directory = Some(directory.clone());
            if !configured_remote {
                self.session.remote_path = directory;
            }
        } else {
            debug!("Bootstrap directory not accepted: {:?}", reply.output);
        }

        if configured_remote {
            let command = format!("cd {}", self.session.remote_path);
            self.run_silent(&command).await;
        }
    }

    /// Close the channel and forget the credential; safe to call repeatedly
    pub async fn disconnect(&mut self) {
        if let Some(executor) = self.executor.take() {
            executor.close().await;
            info!("Disconnected from {}", self.session.host);
        }

        self.session.credential = Credential::default();
        self.session.state = ConnectionState::Disconnected;
        self.session.prompt = None;
        self.session.question_pending = false;
    }

    /// Connect again with the credentials already held; ignored while connected
    pub async fn reconnect(&mut self) -> Result<(), ConnectError> {
        if self.is_connected() {
            self.emit("Already connected.", SemanticColor::Warning);
            return Ok(());
        }

        if let Some(executor) = self.executor.take() {
            executor.close().await;
        }
        self.connect().await
    }

    /// Connected with an open channel
    pub fn is_connected(&self) -> bool {
        self.session.is_connected() && self.executor.as_ref().is_some_and(|e| e.is_open())
    }

    /// Request carrying the configured limits
    pub fn request(&self, command: &str) -> CommandRequest {
        match &self.executor {
            Some(executor) => executor.request(command),
            None => CommandRequest::new(command)
                .with_timeout(self.config.command_timeout())
                .with_min_wait(self.config.command_min_wait()),
        }
    }

    /// Send a request over the live channel
    pub async fn send(&mut self, request: CommandRequest) -> CommandResult {
        match &self.executor {
            Some(executor) => executor.send_command(&mut self.session, request).await,
            None => {
                warn!("No channel for '{}'", request.command());
                self.emit("Not connected.", SemanticColor::Error);
                CommandResult::not_sent()
            }
        }
    }

    /// Send a displayed command with the configured limits
    pub async fn run(&mut self, command: &str) -> CommandResult {
        let request = self.request(command);
        self.send(request).await
    }

    /// Send a command whose output is only captured
    pub async fn run_silent(&mut self, command: &str) -> CommandResult {
        let request = self.request(command).silent();
        self.send(request).await
    }

    /// Record host, user and paths in the host history
    pub fn save_history(&mut self) {
        let mut record = HostRecord::new(
            &self.history_name(&self.session.host, self.session.port),
            &self.session.username,
        );
        record.local_path = self.session.local_path.display().to_string();
        record.remote_path = self.session.remote_path.clone();
        record.environment = self.session.environment.clone();

        match self.store.save_host(record) {
            Ok(saved) => self.session.host_id = Some(saved.host_id),
            Err(e) => {
                warn!("Cannot save host history: {}", e);
                self.emit(&format!("Host history not saved: {}", e), SemanticColor::Warning);
            }
        }
    }

    /// Re-read the data file
    pub fn reload_store(&mut self) -> Result<(), StoreError> {
        self.store.reload()
    }

    pub fn data_file(&self) -> &Path {
        self.store.path()
    }

    /// Close everything down
    pub async fn shutdown_session(&mut self) {
        info!("Shutting down session");
        self.disconnect().await;
    }
}
