// ABOUTME: Library root for botfleet-telegram.
// ABOUTME: Exports the Telegram worker factory, config, commands, and the service run loop.

pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod worker;

pub use commands::TenantCommand;
pub use config::Config;
pub use error::{Result, ServiceError};
pub use handlers::{reply_for, Reply};
pub use worker::{TelegramSession, TelegramWorkerFactory};

use anyhow::Context;
use botfleet_core::{SqliteConfigStore, StartOutcome, Supervisor};
use tokio::signal;
use tracing::{info, warn};

/// Run the fleet until Ctrl+C or SIGTERM, then stop every bot.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let db_path = config.database.resolved_path()?;
    let store = SqliteConfigStore::open(&db_path)
        .await
        .with_context(|| format!("opening tenant store at {}", db_path.display()))?;

    let factory = TelegramWorkerFactory::new(config.telegram.poll_timeout_secs);
    let supervisor = Supervisor::new(factory, config.supervisor);

    let report = supervisor.boot(&store).await.context("loading enabled tenants")?;
    info!(
        started = report.started(),
        total = report.outcomes.len(),
        "Bot fleet booted"
    );
    for (tenant_id, outcome) in &report.outcomes {
        if !matches!(outcome, StartOutcome::Started) {
            warn!(tenant_id = %tenant_id, outcome = %outcome, "Tenant bot not started at boot");
        }
    }

    shutdown_signal().await;

    supervisor.stop_all().await;
    store.close().await;
    info!("Bot fleet shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
