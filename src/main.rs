//! podstore - persist podcast RSS feeds into PostgreSQL
//!
//! This is the main entry point for the podstore binary.
//! The actual logic is in the library modules for better testability.

use anyhow::{Context, Result};
use clap::Parser;
use podstore::commands::{Cli, Command, download, execute};
use podstore::config::load_settings;
use podstore::db::PostgresStore;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is normal outside development
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut settings =
        load_settings(cli.config.as_deref()).context("failed to load configuration")?;
    settings
        .apply_env(|name| std::env::var(name).ok())
        .context("invalid environment override")?;
    cli.apply_to(&mut settings).context("invalid --database-url")?;

    // Downloading episodes never touches the database
    let result = if let Command::Download { source, dir } = &cli.command {
        download(source, dir).await
    } else {
        let options = settings.resolve().context("invalid configuration")?;
        tracing::info!(
            target = %options.connection.connection_string(),
            debug_target = settings.debug.use_debug_target,
            "connecting"
        );
        let store = PostgresStore::connect(&options)
            .await
            .context("failed to open connection pool")?;
        let result = execute(&store, &cli.command).await;
        store.close();
        result
    };

    let output = result?;
    println!("{}", output.message);
    Ok(if output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Install the global subscriber; `RUST_LOG` overrides the `info` default
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
