use colored::Colorize;
use linux_commander::{
    AppResult,
    cli::{Cli, Commands},
    config::Config,
    init_logging,
    session::{CommandRouter, InputReader, SessionManager, ShutdownSignal},
    store::TableStore,
};
use std::time::Duration;

/// Time the command loop gets to finish after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    if let Commands::Config { action } = cli.command() {
        Config::handle_command(&action, &cli.config_file)?;
        return Ok(());
    }

    // Load configuration
    let config = Config::load_or_default(&cli.config_file);
    config.validate()?;

    // Initialize logging
    let _log_guard = init_logging(&cli.effective_log_level(), &config.log.file_path)?;

    tracing::info!("Linux Commander starting...");
    tracing::debug!("CLI arguments: host={:?} user={:?} port={:?}", cli.host, cli.user, cli.port);

    let store = TableStore::open(&cli.data_file)?;

    if cli.is_dry_run_mode() {
        config.display()?;
        println!("{}", format!("Translation rules from {}:", cli.data_file).bold());
        for rule in store.translation_rules() {
            println!(
                "  {:<10} -> {} {}",
                rule.typed.cyan(),
                rule.change_to,
                rule.options.dimmed()
            );
        }
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.trigger("interrupted");
            }
        });
    }

    // Create session manager
    let mut manager = SessionManager::new(config, &cli.config_file, store, shutdown.clone());

    if !manager.initialize(&cli).await? {
        tracing::info!("No host selected, exiting");
        return Ok(());
    }

    if let Err(e) = manager.connect().await {
        tracing::error!("Connection failed: {}", e);
        eprintln!("{}", e.to_string().red());
        return Ok(());
    }

    // Run interactive session
    let mut router = CommandRouter::new(manager);
    let mut input = InputReader::stdin();

    let outcome = tokio::select! {
        result = router.run(&mut input) => result,
        _ = async {
            shutdown.wait().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            tracing::warn!("Command loop did not stop within {:?}", SHUTDOWN_GRACE);
            Ok(())
        }
    };

    router.manager_mut().shutdown_session().await;
    outcome?;

    tracing::info!("Linux Commander stopped");
    Ok(())
}
