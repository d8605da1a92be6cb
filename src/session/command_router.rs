//! Command Router for interactive command processing
//!
//! Every input line is either a local action, a shorthand rewritten through the
//! [`TranslationTable`], or a command forwarded to the remote shell unchanged.

use anyhow::{Result, anyhow};
use chrono::Local;
use regex::Regex;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::command_executor::parse_directory_reply;
use super::input::InputReader;
use super::session_manager::SessionManager;
use crate::transfer::{Direction, TransferError};
use crate::translation::{TranslationTable, internal_command};
use crate::ui::{SemanticColor, cli as screens};

/// Shown after a listing shorthand
const LEGEND_HINT: &str = "\n Type 'legend' for more information on colors.\n";

/// One step of the automation toolchain installation
struct InstallStep {
    label: &'static str,
    command: &'static str,
    /// Completion pattern other than the prompt
    expect: Option<&'static str>,
    timeout_secs: u64,
}

const ANSIBLE_STEPS: &[InstallStep] = &[
    InstallStep {
        label: "Installing Python3.",
        command: "sudo yum install python3-pip",
        expect: None,
        timeout_secs: 60,
    },
    InstallStep {
        label: "Downloading get-pip.py.",
        command: "curl https://bootstrap.pypa.io/get-pip.py -o get-pip.py",
        expect: None,
        timeout_secs: 60,
    },
    InstallStep {
        label: "Installing PIP.",
        command: "python3 get-pip.py",
        expect: Some("Successfully installed"),
        timeout_secs: 60,
    },
    InstallStep {
        label: "Installing pexpect for python.",
        command: "pip install pexpect",
        expect: None,
        timeout_secs: 30,
    },
    InstallStep {
        label: "PIP Installing Ansible.",
        command: "pip install ansible",
        expect: Some("(Successfully built ansible|satisfied: pycparser)"),
        timeout_secs: 90,
    },
    InstallStep {
        label: "Deleting get-pip.py.",
        command: "rm -f get-pip.py",
        expect: None,
        timeout_secs: 10,
    },
];

/// Interactive commands for the terminal session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveCommand {
    /// Quit the application
    Exit,
    /// Show listing colours
    Legend,
    /// Explain permission strings
    Permissions,
    /// Show the user name of the session
    WhoAmI,
    /// Clear the screen
    Clear,
    /// Show help for local commands and shorthands
    Help,
    /// List a local directory, the local path by default
    LocalDir { path: Option<String> },
    /// Pull a remote file, edit it locally and push it back
    Edit { file: String },
    /// Edit the data file and reload translations
    EditConfig,
    /// Application and host information
    About,
    /// Disconnect and pick another host
    NewHost,
    /// Connect again with the current credentials
    Reconnect,
    /// Set the remote clock to the local time
    SyncDate,
    /// Install pip and Ansible on the remote host
    InstallAnsible,
    /// Reset the local path to the default workspace
    ClearLocal,
    SetLocal { path: String },
    SetRemote { path: String },
    /// Show local and remote paths
    Sets,
    WhereAmI { more: bool },
    /// Download a file from the current remote directory
    GetFile { file: String },
    /// Upload a file into the current remote directory
    SendFile { path: String },
    /// Upload the local path to the remote path
    Publish,
    /// Download the remote copy of the local path
    Refresh,
    /// Send a command to the remote shell
    Remote {
        command: String,
        clear_screen: bool,
        legend_hint: bool,
    },
}

impl InteractiveCommand {
    fn remote(command: impl Into<String>) -> Self {
        InteractiveCommand::Remote {
            command: command.into(),
            clear_screen: false,
            legend_hint: false,
        }
    }
}

fn usage_error(name: &str) -> anyhow::Error {
    match internal_command(name) {
        Some(spec) => anyhow!("Usage: {}", spec.usage.replace(';', " | ")),
        None => anyhow!("'{}' needs an argument", name),
    }
}

fn require_args(name: &str, args: &[&str]) -> Result<String> {
    if args.is_empty() {
        return Err(usage_error(name));
    }
    Ok(args.join(" "))
}

/// Command router for processing interactive commands
pub struct CommandRouter {
    /// Connection and shell state
    manager: SessionManager,
    /// Shorthand rules from the data file
    translations: TranslationTable,
}

impl CommandRouter {
    /// Create a new CommandRouter
    pub fn new(manager: SessionManager) -> Self {
        let translations = TranslationTable::new(manager.store().translation_rules());
        debug!("Loaded {} translation rules", translations.len());

        Self {
            manager,
            translations,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SessionManager {
        &mut self.manager
    }

    pub fn translations(&self) -> &TranslationTable {
        &self.translations
    }

    /// Parse interactive command from string input
    pub fn parse_interactive_command(&self, input: &str) -> Result<Option<InteractiveCommand>> {
        let input = input.trim();

        if input.is_empty() {
            return Ok(None);
        }

        match input.to_lowercase().as_str() {
            "exit" => return Ok(Some(InteractiveCommand::Exit)),
            "legend" => return Ok(Some(InteractiveCommand::Legend)),
            "permissions" => return Ok(Some(InteractiveCommand::Permissions)),
            "whoami" => return Ok(Some(InteractiveCommand::WhoAmI)),
            "cls" | "clear" => return Ok(Some(InteractiveCommand::Clear)),
            "help" => return Ok(Some(InteractiveCommand::Help)),
            "-help" => return Ok(Some(InteractiveCommand::remote("help"))),
            _ => {}
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let args = &parts[1..];

        let command = match parts[0] {
            "local-dir" => InteractiveCommand::LocalDir {
                path: (!args.is_empty()).then(|| args.join(" ")),
            },
            "edit" => InteractiveCommand::Edit {
                file: require_args("edit", args)?,
            },
            "edit-config" => InteractiveCommand::EditConfig,
            "about" => InteractiveCommand::About,
            "new-host" => InteractiveCommand::NewHost,
            "recon" => InteractiveCommand::Reconnect,
            "sync-date" => InteractiveCommand::SyncDate,
            "install-ansible" => InteractiveCommand::InstallAnsible,
            "clear-local" => InteractiveCommand::ClearLocal,
            "set-local" => InteractiveCommand::SetLocal {
                path: require_args("set-local", args)?,
            },
            "set-remote" => InteractiveCommand::SetRemote {
                path: require_args("set-remote", args)?,
            },
            "sets" => InteractiveCommand::Sets,
            "whereami" => InteractiveCommand::WhereAmI {
                more: args.contains(&"--more"),
            },
            "get-file" => InteractiveCommand::GetFile {
                file: require_args("get-file", args)?,
            },
            "send-file" => InteractiveCommand::SendFile {
                path: require_args("send-file", args)?,
            },
            "publish" => InteractiveCommand::Publish,
            "refresh" => InteractiveCommand::Refresh,
            "shell" | "set" => {
                return Err(anyhow!(
                    "{} cannot use the '{}' at this time.",
                    env!("CARGO_PKG_NAME"),
                    parts[0]
                ));
            }
            "cat" | "view" if args.is_empty() => {
                return Err(anyhow!(
                    "The command 'cat' requires a filename.  e.g. cat [FILE_NAME]"
                ));
            }
            "cat" => InteractiveCommand::remote(input),
            "view" => InteractiveCommand::remote(format!("cat {}", args.join(" "))),
            typed => InteractiveCommand::Remote {
                command: self
                    .translations
                    .rewrite(typed, args)
                    .unwrap_or_else(|| input.to_string()),
                clear_screen: typed == "ap",
                legend_hint: typed == "dir",
            },
        };

        Ok(Some(command))
    }

    /// Handle one line of user input
    pub async fn handle_line(&mut self, line: &str) -> Result<()> {
        if self.manager.session().question_pending {
            debug!("Forwarding answer to remote question");
            self.manager.run(line.trim()).await;
            return Ok(());
        }

        match self.parse_interactive_command(line)? {
            Some(command) => self.execute(command).await,
            None => Ok(()),
        }
    }

    /// Run the input loop until exit, end of input or shutdown
    pub async fn run(&mut self, input: &mut InputReader) -> Result<()> {
        info!("Command loop started");
        let shutdown = self.manager.shutdown().clone();
        let renderer = self.manager.renderer();

        loop {
            if shutdown.is_triggered() {
                break;
            }

            if !self.manager.session().question_pending {
                renderer.emit(&self.manager.session().prompt_label(), SemanticColor::Prompt, false);
            }

            let line = tokio::select! {
                _ = shutdown.wait() => break,
                line = input.next_line() => line,
            };

            let Some(line) = line else {
                info!("Input closed");
                shutdown.trigger("input closed");
                break;
            };

            if let Err(e) = self.handle_line(&line).await {
                renderer.emit(&e.to_string(), SemanticColor::Error, true);
            }
        }

        info!("Command loop stopped");
        Ok(())
    }

    /// Carry out a parsed command
    pub async fn execute(&mut self, command: InteractiveCommand) -> Result<()> {
        debug!("Executing {:?}", command);
        let renderer = self.manager.renderer();

        match command {
            InteractiveCommand::Exit => self.manager.shutdown().trigger("exit requested"),
            InteractiveCommand::Legend => {
                screens::show_legend(renderer.as_ref(), self.manager.config_file())
            }
            InteractiveCommand::Permissions => screens::show_permissions(renderer.as_ref()),
            InteractiveCommand::WhoAmI => renderer.emit(
                &format!("{}\n", self.manager.session().username),
                SemanticColor::Value,
                true,
            ),
            InteractiveCommand::Clear => renderer.clear(),
            InteractiveCommand::Help => {
                screens::show_help(renderer.as_ref(), &self.translations, self.manager.data_file())
            }
            InteractiveCommand::LocalDir { path } => {
                let path = path
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.manager.session().local_path.clone());
                screens::show_local_dir(renderer.as_ref(), &path)?;
            }
            InteractiveCommand::Edit { file } => self.edit_remote_file(&file).await?,
            InteractiveCommand::EditConfig => self.edit_config().await?,
            InteractiveCommand::About => {
                screens::show_about(renderer.as_ref());
                renderer.emit(
                    &format!("-=#[ {} Information ]#=-", self.manager.session().display_name),
                    SemanticColor::Heading,
                    true,
                );
                self.where_am_i(true).await;
            }
            InteractiveCommand::NewHost => self.new_host().await?,
            InteractiveCommand::Reconnect => {
                if let Err(e) = self.manager.reconnect().await {
                    warn!("Reconnect failed: {}", e);
                }
            }
            InteractiveCommand::SyncDate => {
                let date = Local::now().format("%d %b %Y %H:%M:%S");
                self.manager.run(&format!("date -s \"{}\"", date)).await;
            }
            InteractiveCommand::InstallAnsible => self.install_ansible().await?,
            InteractiveCommand::ClearLocal => {
                let path = self.manager.default_local_path();
                std::fs::create_dir_all(&path)?;
                self.manager.session_mut().local_path = path.clone();
                renderer.emit(
                    &format!("-------------\n {} has been set...\n", path.display()),
                    SemanticColor::Warning,
                    true,
                );
            }
            InteractiveCommand::SetLocal { path } => self.set_local(&path),
            InteractiveCommand::SetRemote { path } => self.set_remote(&path),
            InteractiveCommand::Sets => screens::show_sets(renderer.as_ref(), self.manager.session()),
            InteractiveCommand::WhereAmI { more } => self.where_am_i(more).await,
            InteractiveCommand::GetFile { file } => self.get_file(&file).await,
            InteractiveCommand::SendFile { path } => self.send_file(&path).await,
            InteractiveCommand::Publish => self.publish().await,
            InteractiveCommand::Refresh => self.refresh().await?,
            InteractiveCommand::Remote {
                command,
                clear_screen,
                legend_hint,
            } => {
                if legend_hint {
                    renderer.emit(LEGEND_HINT, SemanticColor::Warning, true);
                }
                if clear_screen {
                    renderer.clear();
                }
                self.manager.run(&command).await;
            }
        }

        Ok(())
    }

    /// Remote directory commands currently run in
    fn current_remote_dir(&self) -> String {
        let session = self.manager.session();
        session
            .remote_directory
            .clone()
            .unwrap_or_else(|| session.remote_path.clone())
    }

    fn remote_file_path(&self, file: &str) -> String {
        if file.starts_with('/') {
            file.to_string()
        } else {
            format!("{}/{}", self.current_remote_dir(), file).replace("//", "/")
        }
    }

    fn render_transfer_error(&self, error: &TransferError) {
        let renderer = self.manager.renderer();
        renderer.emit(&error.to_string(), SemanticColor::Error, true);
        if let Some(help) = error.remediation() {
            renderer.emit(&help, SemanticColor::Warning, true);
        }
    }

    /// Run the copy tool off the async runtime
    async fn copy(&self, local: &Path, remote: &str, direction: Direction) -> bool {
        let transfer = self.manager.transfer();
        let endpoint = self.manager.session().endpoint();
        let local = local.to_path_buf();
        let remote = remote.to_string();

        let copied = tokio::task::spawn_blocking(move || {
            transfer.copy(&endpoint, &local, &remote, direction)
        })
        .await;

        match copied {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("{:?} failed: {}", direction, e);
                self.render_transfer_error(&e);
                false
            }
            Err(e) => {
                error!("Transfer task failed: {}", e);
                false
            }
        }
    }

    async fn get_file(&mut self, file: &str) {
        let renderer = self.manager.renderer();
        let file_name = Path::new(file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string());
        let local = self.manager.session().local_path.join(&file_name);
        let remote = self.remote_file_path(file);

        if local.is_file() {
            if let Err(e) = std::fs::remove_file(&local) {
                warn!("Cannot replace {}: {}", local.display(), e);
            }
        }

        if self.copy(&local, &remote, Direction::Download).await {
            renderer.emit(
                &format!("'{}' saved to '{}'\n", remote, local.display()),
                SemanticColor::Success,
                true,
            );
        }
    }

    async fn send_file(&mut self, path: &str) {
        let renderer = self.manager.renderer();
        let local = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.manager.session().local_path.join(path)
        };

        if !local.is_file() {
            renderer.emit(&format!("{} does not exist.", local.display()), SemanticColor::Error, true);
            return;
        }

        let Some(file_name) = local.file_name().map(|n| n.to_string_lossy().to_string()) else {
            renderer.emit(&format!("{} is not a file.", local.display()), SemanticColor::Error, true);
            return;
        };
        let to_file = format!("{}/{}", self.current_remote_dir(), file_name).replace("//", "/");

        if self.copy(&local, &to_file, Direction::Upload).await {
            self.manager.run_silent(&format!("chmod 755 {}", to_file)).await;
            renderer.emit(
                &format!("'{}' sent to '{}'\n", local.display(), to_file),
                SemanticColor::Success,
                true,
            );
        }
    }

    fn set_local(&mut self, path: &str) {
        let renderer = self.manager.renderer();
        let trimmed = path.trim();
        let dir = trimmed
            .strip_suffix(['/', '\\'])
            .filter(|d| !d.is_empty())
            .unwrap_or(trimmed);

        if !Path::new(dir).is_dir() {
            renderer.emit(&format!("{} does not exist.", dir), SemanticColor::Error, true);
            return;
        }

        self.manager.session_mut().local_path = PathBuf::from(dir);
        self.manager.save_history();
        renderer.emit(
            &format!("-------------\n Local path '{}' has been set...\n", dir),
            SemanticColor::Warning,
            true,
        );
    }

    fn set_remote(&mut self, path: &str) {
        let renderer = self.manager.renderer();
        let trimmed = path.trim();
        let dir = trimmed
            .strip_suffix('/')
            .filter(|d| !d.is_empty())
            .unwrap_or(trimmed);

        if !dir.starts_with('/') {
            renderer.emit(
                &format!("{} must have a slash (on the front)", dir),
                SemanticColor::Error,
                true,
            );
            return;
        }

        self.manager.session_mut().remote_path = dir.to_string();
        self.manager.save_history();
        renderer.emit(
            &format!("-------------\n Remote path '{}' has been set...\n", dir),
            SemanticColor::Warning,
            true,
        );
    }

    async fn where_am_i(&mut self, more: bool) {
        let reply = self.manager.run_silent("pwd").await;
        if reply.success {
            if let Some(directory) = parse_directory_reply(&reply.output) {
                self.manager.session_mut().remote_directory = Some(directory);
            }
        }

        let mut details = Vec::new();
        if more {
            let info = self.manager.run_silent("hostnamectl").await;
            let host_is_address = self.manager.session().host.parse::<Ipv4Addr>().is_ok();

            for line in info.output.lines().filter(|l| !l.trim().is_empty()) {
                if host_is_address {
                    if let Some((_, name)) = line.split_once("Static hostname:") {
                        self.manager.session_mut().display_name = name.trim().to_string();
                    }
                }
                details.push(line.to_string());
            }
        }

        let renderer = self.manager.renderer();
        screens::show_whereami(renderer.as_ref(), self.manager.session(), &details);
    }

    /// Local and remote paths are both set to something narrower than a root
    fn transfer_paths_set(&self, action: &str) -> bool {
        let session = self.manager.session();
        let local = session.local_path.display().to_string();
        if local.len() > 3 && session.remote_path.len() > 1 {
            return true;
        }

        self.manager.renderer().emit(
            &format!(
                "Your local path is set to {}.\n Please change using \"set-local\", before attempting\n to {}.",
                local, action
            ),
            SemanticColor::Error,
            true,
        );
        false
    }

    async fn publish(&mut self) {
        if !self.transfer_paths_set("upload a whole drive and folders to Linux") {
            return;
        }

        let renderer = self.manager.renderer();
        let local = self.manager.session().local_path.clone();
        let remote = self.manager.session().remote_path.clone();

        if !local.is_dir() {
            renderer.emit(
                &format!(
                    "'{}' does not exist.  Change your local directory with 'set-local'.",
                    local.display()
                ),
                SemanticColor::Error,
                true,
            );
            return;
        }

        if !self.copy(&local, &remote, Direction::Upload).await {
            return;
        }

        self.manager.run_silent(&format!("chmod 755 -R {}", remote)).await;
        renderer.clear();
        renderer.emit(
            &format!("'{}' has been uploaded to '{}'.\n", local.display(), remote),
            SemanticColor::Warning,
            true,
        );
        renderer.emit(&format!("List of files in {}", remote), SemanticColor::Warning, true);
        self.manager.run(&format!("ls -ltr {}", remote)).await;
    }

    async fn refresh(&mut self) -> Result<()> {
        if !self.transfer_paths_set("download to a root drive") {
            return Ok(());
        }

        let renderer = self.manager.renderer();
        let local = self.manager.session().local_path.clone();
        let (Some(folder), Some(parent)) = (local.file_name(), local.parent()) else {
            renderer.emit(
                &format!("Cannot refresh into {}", local.display()),
                SemanticColor::Error,
                true,
            );
            return Ok(());
        };

        let remote = format!(
            "{}/{}",
            self.manager.session().remote_path.trim_end_matches('/'),
            folder.to_string_lossy()
        );
        let parent = parent.to_path_buf();

        if !parent.is_dir() {
            renderer.emit(&format!("'{}' does not exist.", parent.display()), SemanticColor::Error, true);
            return Ok(());
        }

        if !self.copy(&parent, &remote, Direction::Download).await {
            return Ok(());
        }

        renderer.clear();
        renderer.emit(
            &format!("'{}' has been downloaded to '{}'.\n", remote, parent.display()),
            SemanticColor::Warning,
            true,
        );
        renderer.emit(&format!("List of files in {}", local.display()), SemanticColor::Warning, true);
        screens::show_local_dir(renderer.as_ref(), &local)
    }

    async fn edit_remote_file(&mut self, file: &str) -> Result<()> {
        let renderer = self.manager.renderer();
        let temp_dir = std::env::temp_dir().join(env!("CARGO_PKG_NAME"));
        std::fs::create_dir_all(&temp_dir)?;

        let file_name = Path::new(file)
            .file_name()
            .ok_or_else(|| anyhow!("'{}' is not a file name", file))?;
        let local = temp_dir.join(file_name);
        let remote = self.remote_file_path(file);

        if !self.copy(&local, &remote, Direction::Download).await {
            return Ok(());
        }

        run_editor(&self.manager.config().editor, &local).await?;

        if self.copy(&local, &remote, Direction::Upload).await {
            renderer.emit(&format!("'{}' has been saved.", remote), SemanticColor::Success, true);
        }
        Ok(())
    }

    async fn edit_config(&mut self) -> Result<()> {
        let data_file = self.manager.data_file().to_path_buf();
        run_editor(&self.manager.config().editor, &data_file).await?;

        self.manager.reload_store()?;
        self.translations = TranslationTable::new(self.manager.store().translation_rules());
        info!("Reloaded {} translation rules", self.translations.len());
        self.manager.renderer().emit(
            &format!("Reloaded {} translation rules.", self.translations.len()),
            SemanticColor::Success,
            true,
        );
        Ok(())
    }

    async fn new_host(&mut self) -> Result<()> {
        self.manager.disconnect().await;
        self.manager.renderer().clear();

        if !self.manager.choose_host().await? {
            self.manager.shutdown().trigger("no host selected");
            return Ok(());
        }

        if let Err(e) = self.manager.connect().await {
            warn!("Connecting to new host failed: {}", e);
        }
        Ok(())
    }

    async fn install_ansible(&mut self) -> Result<()> {
        let renderer = self.manager.renderer();
        renderer.clear();

        for step in ANSIBLE_STEPS {
            let mut request = self
                .manager
                .request(step.command)
                .silent()
                .with_timeout(Duration::from_secs(step.timeout_secs))
                .with_min_wait(Duration::ZERO);
            if let Some(pattern) = step.expect {
                request = request.expecting(Regex::new(pattern)?);
            }

            let result = self.manager.send(request).await;
            screens::install_step(renderer.as_ref(), step.label, result.success);

            if self.manager.shutdown().is_triggered() {
                return Ok(());
            }
        }

        renderer.emit("Finished..\n", SemanticColor::Normal, true);
        for command in ["pip --version", "python3 --version", "pip freeze"] {
            self.manager.run(command).await;
        }
        Ok(())
    }
}

/// Open `path` in the configured editor and wait for it to close
async fn run_editor(editor: &str, path: &Path) -> Result<()> {
    let mut words = editor.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| anyhow!("No editor configured"))?
        .to_string();
    let mut args: Vec<String> = words.map(str::to_string).collect();
    args.push(path.display().to_string());

    let status = tokio::task::spawn_blocking(move || {
        std::process::Command::new(&program).args(&args).status()
    })
    .await??;

    if !status.success() {
        warn!("Editor exited with {}", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::ShutdownSignal;
    use crate::store::TableStore;
    use crate::ui::CaptureRenderer;
    use std::sync::Arc;

    fn router(dir: &Path) -> CommandRouter {
        let store = TableStore::open(dir.join("data.json")).unwrap();
        let manager = SessionManager::new(Config::default(), "config.toml", store, ShutdownSignal::new())
            .with_renderer(Arc::new(CaptureRenderer::new()))
            .without_probe();
        CommandRouter::new(manager)
    }

    fn parse(router: &CommandRouter, input: &str) -> InteractiveCommand {
        router.parse_interactive_command(input).unwrap().unwrap()
    }

    #[test]
    fn test_local_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());

        assert_eq!(router.parse_interactive_command("   ").unwrap(), None);
        assert_eq!(parse(&router, "EXIT"), InteractiveCommand::Exit);
        assert_eq!(parse(&router, "cls"), InteractiveCommand::Clear);
        assert_eq!(parse(&router, "clear"), InteractiveCommand::Clear);
        assert_eq!(parse(&router, "-help"), InteractiveCommand::remote("help"));
        assert_eq!(
            parse(&router, "whereami --more"),
            InteractiveCommand::WhereAmI { more: true }
        );
        assert_eq!(
            parse(&router, "local-dir"),
            InteractiveCommand::LocalDir { path: None }
        );
    }

    #[test]
    fn test_shorthand_translation() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());

        assert_eq!(
            parse(&router, "dir"),
            InteractiveCommand::Remote {
                command: "ls -ltr".to_string(),
                clear_screen: false,
                legend_hint: true,
            }
        );
        assert_eq!(
            parse(&router, "dir -a /etc"),
            InteractiveCommand::Remote {
                command: "ls -a /etc".to_string(),
                clear_screen: false,
                legend_hint: true,
            }
        );
        assert_eq!(
            parse(&router, "ap site.yml"),
            InteractiveCommand::Remote {
                command: "ansible-playbook site.yml".to_string(),
                clear_screen: true,
                legend_hint: false,
            }
        );
        assert_eq!(parse(&router, "uptime -p"), InteractiveCommand::remote("uptime -p"));
    }

    #[test]
    fn test_rejected_and_incomplete_commands() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());

        let err = router.parse_interactive_command("shell").unwrap_err();
        assert!(err.to_string().contains("cannot use the 'shell'"));

        let err = router.parse_interactive_command("cat").unwrap_err();
        assert!(err.to_string().contains("requires a filename"));

        let err = router.parse_interactive_command("set-local").unwrap_err();
        assert_eq!(err.to_string(), "Usage: set-local [LOCAL_PATH]");

        assert_eq!(parse(&router, "view /etc/hosts"), InteractiveCommand::remote("cat /etc/hosts"));
    }

    #[tokio::test]
    async fn test_set_remote_requires_leading_slash() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = router(dir.path());

        router.handle_line("set-remote var/www").await.unwrap();
        assert_eq!(router.manager().session().remote_path, "/");

        router.handle_line("set-remote /var/www/").await.unwrap();
        assert_eq!(router.manager().session().remote_path, "/var/www");
    }

    #[tokio::test]
    async fn test_exit_triggers_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = router(dir.path());

        router.handle_line("exit").await.unwrap();
        assert!(router.manager().shutdown().is_triggered());
    }
}
