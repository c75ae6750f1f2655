//! valkey-env-manager - interactive manager for Valkey/Redis environments

use anyhow::Result;
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;

use valkey_env_manager::config::{AppConfig, CliArgs};
use valkey_env_manager::manager::{Console, Manager, NetworkConnector};
use valkey_env_manager::utils::{signal, InterruptFlag};

fn setup_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse_args();

    setup_logging(args.verbose, args.quiet);

    // Before any other thread exists, so the signal mask is inherited
    let interrupt = InterruptFlag::new();
    signal::install_handler(interrupt.clone());

    let config =
        AppConfig::from_cli(&args).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    debug!(
        "{} environments available from {}",
        config.environments.len(),
        config.config_path.display()
    );

    let mut manager = Manager::new(
        config.environments,
        config.connect_timeout,
        NetworkConnector,
        Console::stdio(config.quiet),
        interrupt,
    );
    manager.run()?;

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
