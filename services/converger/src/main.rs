//! BBS Converger
//!
//! Competes for the converge lock and, once it holds it, gathers and prunes
//! convergence input on an interval. Exits with an error if the lock is
//! lost so a supervisor can restart it as a fresh competitor.

use std::sync::Arc;

use anyhow::Result;
use bbs::{Bbs, LockError};
use bbs_converger::{Config, ConvergenceWorker};
use bbs_store::{KeyedStore, SqliteStore};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to BBS_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting bbs converger");
    info!(
        converger_id = %config.converger_id,
        db_path = %config.db_path,
        heartbeat_interval_secs = config.lock.heartbeat_interval.as_secs(),
        lock_ttl_secs = config.lock.ttl.as_secs(),
        convergence_interval_secs = config.convergence_interval_secs,
        "Configuration loaded"
    );

    let store = if config.db_path == ":memory:" {
        SqliteStore::open_in_memory()
    } else {
        SqliteStore::open(&config.db_path)
    };
    let store: Arc<dyn KeyedStore> = match store {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "Failed to open store");
            return Err(e.into());
        }
    };
    let bbs = Bbs::new(store);

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal, shutting down");
            return;
        }
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let heartbeater = bbs
        .locks
        .new_converge_lock(config.converger_id.clone(), config.lock);
    let lock = match heartbeater.acquire(shutdown_rx.clone()).await {
        Ok(lock) => lock,
        Err(LockError::Cancelled) => {
            info!("Shut down before acquiring the converge lock");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let worker = ConvergenceWorker::new(bbs, config.convergence_interval());
    if let Err(e) = worker.run(lock, shutdown_rx).await {
        error!(error = %e, "Convergence worker stopped");
        return Err(e.into());
    }

    info!("Converger shutdown complete");
    Ok(())
}
