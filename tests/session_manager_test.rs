//! Session manager tests driven by a scripted connector and prompter

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use linux_commander::cli::Cli;
use linux_commander::config::Config;
use linux_commander::session::{ScriptedPrompter, SessionManager, ShutdownSignal};
use linux_commander::session::ConnectionState;
use linux_commander::store::{HostRecord, TableStore};
use linux_commander::transport::mock::MockReply;
use linux_commander::transport::{ConnectError, MockConnector, MockTransport};
use linux_commander::ui::CaptureRenderer;

fn manager(
    dir: &Path,
    connector: Arc<MockConnector>,
    prompter: ScriptedPrompter,
) -> Result<(SessionManager, Arc<CaptureRenderer>)> {
    manager_with(dir, Config::default(), connector, prompter)
}

fn manager_with(
    dir: &Path,
    mut config: Config,
    connector: Arc<MockConnector>,
    prompter: ScriptedPrompter,
) -> Result<(SessionManager, Arc<CaptureRenderer>)> {
    config.local_path = dir.join("workspace").display().to_string();

    let store = TableStore::open(dir.join("data.json"))?;
    let renderer = Arc::new(CaptureRenderer::new());
    let manager = SessionManager::new(config, "config.toml", store, ShutdownSignal::new())
        .with_renderer(renderer.clone())
        .with_prompter(Box::new(prompter))
        .with_connector(connector)
        .without_probe();
    Ok((manager, renderer))
}

fn cli(args: &[&str]) -> Cli {
    Cli::parse_from(std::iter::once("linux-commander").chain(args.iter().copied()))
}

#[tokio::test]
async fn test_auth_retry_then_bootstrap() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = Arc::new(
        MockConnector::new(MockTransport::builder().respond("pwd -P", "/root\r\n"))
            .with_password("s3cret"),
    );
    let prompter = ScriptedPrompter::new().secret("wrong").secret("s3cret");
    let (mut manager, renderer) = manager(dir.path(), connector.clone(), prompter)?;

    assert!(manager.initialize(&cli(&["--host", "web01", "--user", "root"])).await?);
    manager.connect().await?;

    assert_eq!(connector.attempts().len(), 2);
    assert!(renderer.text().contains("Access denied (1/3). Try again."));
    assert!(manager.is_connected());

    let session = manager.session();
    assert_eq!(session.remote_directory.as_deref(), Some("/root"));
    assert_eq!(session.prompt_directory.as_deref(), Some("root"));
    assert_eq!(session.remote_path, "/root");
    assert!(session.local_path.is_dir());

    let hosts = manager.store().hosts();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].host_name, "web01");
    assert_eq!(hosts[0].remote_path, "/root");
    Ok(())
}

#[tokio::test]
async fn test_unfinished_bootstrap_query_is_ignored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = Arc::new(MockConnector::new(
        MockTransport::builder().respond_with("pwd -P", MockReply::hang("/root\r\n")),
    ));
    let mut config = Config::default();
    config.command.timeout_secs = 1;
    config.command.grace_ms = 200;
    let (mut manager, _renderer) =
        manager_with(dir.path(), config, connector.clone(), ScriptedPrompter::new())?;

    manager.initialize(&cli(&["--host", "web01", "--user", "root", "--password", "pw"])).await?;
    manager.connect().await?;

    let session = manager.session();
    assert!(session.remote_directory.is_none());
    assert!(session.prompt_directory.is_none());
    assert_eq!(session.remote_path, "/");
    assert_ne!(manager.store().hosts()[0].remote_path, "/root");
    Ok(())
}

#[tokio::test]
async fn test_banner_reply_repeats_bootstrap_query() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let banner = format!("{}\r\n/root\r\n", "Authorized access only. Activity is monitored.".repeat(2));
    let connector = Arc::new(MockConnector::new(
        MockTransport::builder()
            .respond_with("pwd -P", MockReply::output(banner))
            .respond_with("pwd -P", MockReply::output("/root\r\n")),
    ));
    let (mut manager, _renderer) = manager(dir.path(), connector.clone(), ScriptedPrompter::new())?;

    manager.initialize(&cli(&["--host", "web01", "--user", "root", "--password", "pw"])).await?;
    manager.connect().await?;

    let handle = connector.last_transport().unwrap();
    let queries = handle.written_lines().iter().filter(|l| *l == "pwd -P").count();
    assert_eq!(queries, 2);
    assert_eq!(manager.session().remote_directory.as_deref(), Some("/root"));
    assert_eq!(manager.session().prompt_directory.as_deref(), Some("root"));
    Ok(())
}

#[tokio::test]
async fn test_caps_lock_password_is_asked_again() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = Arc::new(
        MockConnector::new(MockTransport::builder().respond("pwd -P", "/root\r\n"))
            .with_password("hunter"),
    );
    let prompter = ScriptedPrompter::new().secret("HUNTER").secret("hunter");
    let (mut manager, renderer) = manager(dir.path(), connector.clone(), prompter)?;

    manager.initialize(&cli(&["--host", "web01", "--user", "root"])).await?;
    manager.connect().await?;

    assert!(renderer.text().contains("## CapsLock was ON ##"));
    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(connector.attempts()[0].password, "hunter");
    assert!(manager.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_auth_attempts_exhausted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = Arc::new(MockConnector::new(MockTransport::builder()).with_password("s3cret"));
    let prompter = ScriptedPrompter::new().secret("one").secret("two").secret("three");
    let (mut manager, _renderer) = manager(dir.path(), connector.clone(), prompter)?;

    manager.initialize(&cli(&["--host", "web01:2222", "--user", "deploy"])).await?;
    let err = manager.connect().await.unwrap_err();

    assert!(matches!(err, ConnectError::AuthRejected { .. }));
    assert_eq!(connector.attempts().len(), 3);
    assert_eq!(connector.attempts()[0].port, 2222);
    assert_eq!(manager.session().state, ConnectionState::Failed);
    assert!(manager.session().credential.is_empty());
    assert!(manager.shutdown().is_triggered());
    Ok(())
}

#[tokio::test]
async fn test_cancelled_password_prompt() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = Arc::new(MockConnector::new(MockTransport::builder()));
    let (mut manager, _renderer) = manager(dir.path(), connector.clone(), ScriptedPrompter::new())?;

    manager.initialize(&cli(&["--host", "web01", "--user", "root"])).await?;
    let err = manager.connect().await.unwrap_err();

    assert!(matches!(err, ConnectError::Cancelled));
    assert!(connector.attempts().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_host_menu_selection_uses_saved_paths() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let local = dir.path().join("site");
    {
        let mut store = TableStore::open(dir.path().join("data.json"))?;
        let mut record = HostRecord::new("db01:2200", "postgres");
        record.local_path = local.display().to_string();
        record.remote_path = "/srv/app".to_string();
        store.save_host(record)?;
    }

    let connector = Arc::new(MockConnector::new(
        MockTransport::builder().respond("pwd -P", "/var/lib/pgsql\r\n"),
    ));
    let prompter = ScriptedPrompter::new().line("07").line("01").secret("pw");
    let (mut manager, renderer) = manager(dir.path(), connector.clone(), prompter)?;

    assert!(manager.initialize(&cli(&[])).await?);
    assert!(renderer.text().contains("[ 07 ] not found. Try again."));

    let session = manager.session();
    assert_eq!(session.host, "db01");
    assert_eq!(session.port, 2200);
    assert_eq!(session.remote_path, "/srv/app");

    manager.connect().await?;
    let handle = connector.last_transport().unwrap();
    assert!(handle.written_lines().contains(&"cd /srv/app".to_string()));
    assert_eq!(manager.session().remote_path, "/srv/app");
    assert!(local.is_dir());
    Ok(())
}

#[tokio::test]
async fn test_host_menu_quit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let mut store = TableStore::open(dir.path().join("data.json"))?;
        store.save_host(HostRecord::new("web01", "root"))?;
    }

    let connector = Arc::new(MockConnector::new(MockTransport::builder()));
    let prompter = ScriptedPrompter::new().line("q");
    let (mut manager, _renderer) = manager(dir.path(), connector, prompter)?;

    assert!(!manager.initialize(&cli(&[])).await?);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = Arc::new(MockConnector::new(MockTransport::builder()));
    let (mut manager, _renderer) = manager(dir.path(), connector.clone(), ScriptedPrompter::new())?;

    manager.initialize(&cli(&["--host", "web01", "--user", "root", "--password", "pw"])).await?;
    manager.connect().await?;
    assert!(manager.is_connected());

    manager.disconnect().await;
    manager.disconnect().await;

    assert!(!manager.is_connected());
    assert_eq!(manager.session().state, ConnectionState::Disconnected);
    assert!(!connector.last_transport().unwrap().is_open());
    Ok(())
}
