//! Convergence background worker.
//!
//! Gathers convergence input on a periodic interval for as long as the
//! converge lock is held.

use std::time::Duration;

use bbs::{Bbs, BbsResult, ConvergenceInput, HeldLock, LockError, LockState};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// Runs convergence gathers while holding the converge lock.
pub struct ConvergenceWorker {
    bbs: Bbs,
    interval: Duration,
}

impl ConvergenceWorker {
    pub fn new(bbs: Bbs, interval: Duration) -> Self {
        Self { bbs, interval }
    }

    /// Gather until shutdown is signalled or the lock is lost.
    ///
    /// Releases the lock on shutdown. Returns [`LockError::Lost`] if the
    /// lock was lost; no gather runs after that point.
    #[instrument(skip_all, fields(lock = %lock.key()))]
    pub async fn run(
        &self,
        mut lock: HeldLock,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), LockError> {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting convergence worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tokio::select! {
                        result = self.run_once() => {
                            if let Err(e) = result {
                                error!(error = %e, "Convergence gather failed");
                            }
                        }
                        state = lock.wait_lost() => return lost(&lock, state),
                    }
                }
                state = lock.wait_lost() => return lost(&lock, state),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Convergence worker shutting down");
                        break;
                    }
                }
            }
        }

        lock.release().await
    }

    /// Run a single gather pass with a fresh view of the cells.
    pub async fn run_once(&self) -> BbsResult<ConvergenceInput> {
        let cells_loader = self.bbs.new_cells_loader();
        let input = self
            .bbs
            .lrps
            .gather_and_prune_lrp_convergence_input(&cells_loader)
            .await?;

        let orphaned = input.orphaned_process_guids().len();
        if orphaned > 0 {
            info!(orphaned, "Found actual LRPs without a desired LRP");
        }

        Ok(input)
    }
}

fn lost(lock: &HeldLock, state: LockState) -> Result<(), LockError> {
    warn!(?state, "Converge lock no longer held, stopping");
    Err(LockError::Lost {
        key: lock.key().to_string(),
    })
}
