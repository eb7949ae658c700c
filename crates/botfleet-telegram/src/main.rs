// ABOUTME: Entry point for the botfleet binary.
// ABOUTME: Runs the multi-tenant bot service or edits tenant configs in the store.

use anyhow::Result;
use botfleet_core::SqliteConfigStore;
use botfleet_telegram::{commands, Config, TenantCommand};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "botfleet")]
#[command(about = "Runs one Telegram bot per tenant using Long Polling")]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "BOTFLEET_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every enabled tenant's bot and run until interrupted
    Serve,
    /// Inspect or edit tenant bot configs
    #[command(subcommand)]
    Tenant(TenantCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Serve => botfleet_log::init_for(&["botfleet_telegram", "botfleet_core"]),
        Commands::Tenant(_) => botfleet_log::init(),
    }
    let config = Config::load(cli.config)?;

    match cli.command {
        Commands::Serve => botfleet_telegram::run(config).await,
        Commands::Tenant(command) => {
            let store = SqliteConfigStore::open(&config.database.resolved_path()?).await?;
            let output = commands::execute(command, &store).await;
            store.close().await;
            println!("{}", output?);
            Ok(())
        }
    }
}
