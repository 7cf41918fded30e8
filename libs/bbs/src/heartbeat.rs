//! TTL-key mutual exclusion.
//!
//! A lock is a key whose value is the holder's identifier. Acquiring creates
//! the key only if it is absent. While held, a background task rewrites the
//! key with compare-and-swap every heartbeat interval, which resets its TTL.
//! If the holder stops renewing, the key expires and a competitor can create
//! it.
//!
//! The renewal task belongs to the [`HeldLock`] returned on acquisition.
//! Holders observe loss through [`HeldLock::state`] or [`HeldLock::wait_lost`]
//! and must stop role work as soon as the lock is no longer held.

use std::sync::Arc;
use std::time::Duration;

use bbs_store::{KeyedStore, StoreError, StoreNode};
use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Nominal renewal cadence for bulletin board locks.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default TTL as a multiple of the heartbeat interval.
const TTL_MULTIPLIER: u32 = 3;

/// Default base delay between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive renewal failures logged at `warn` before escalating to `error`.
const QUIET_FAILURES: u32 = 3;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors from acquiring, renewing, or releasing a lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder owns the lock. Retry later.
    #[error("lock {key} is held by {holder}")]
    Contended { key: String, holder: String },

    /// The lock was taken over or expired while we believed we held it.
    #[error("lost lock {key}")]
    Lost { key: String },

    /// Acquisition was abandoned because shutdown was requested.
    #[error("lock acquisition cancelled")]
    Cancelled,

    #[error("invalid parameter: {field}")]
    InvalidParameter { field: &'static str },

    /// The renewal task panicked or was aborted.
    #[error("renewal task failed: {0}")]
    Task(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Timing for a heartbeat lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// How long the key lives without renewal.
    pub ttl: Duration,

    /// How often a holder renews the key. Must be shorter than `ttl`.
    pub heartbeat_interval: Duration,

    /// Base delay between acquisition attempts. Doubles after each
    /// contended attempt, up to `heartbeat_interval`.
    pub retry_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::new(HEARTBEAT_INTERVAL)
    }
}

impl LockConfig {
    /// Config renewing every `heartbeat_interval`, with a TTL of three intervals.
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            ttl: heartbeat_interval.saturating_mul(TTL_MULTIPLIER),
            heartbeat_interval,
            retry_interval: RETRY_INTERVAL.min(heartbeat_interval),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(LockError::InvalidParameter {
                field: "heartbeat_interval",
            });
        }
        // The store counts TTLs in whole seconds.
        if self.ttl < Duration::from_secs(1) || self.ttl <= self.heartbeat_interval {
            return Err(LockError::InvalidParameter { field: "ttl" });
        }
        if self.retry_interval.is_zero() {
            return Err(LockError::InvalidParameter {
                field: "retry_interval",
            });
        }
        Ok(())
    }

    /// TTL in store units, rounded up.
    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs() + u64::from(self.ttl.subsec_nanos() > 0)
    }

    /// Delay before the next acquisition attempt, with up to 25% jitter.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self
            .retry_interval
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.heartbeat_interval);
        let jitter_ms = u64::try_from(base.as_millis() / 4).unwrap_or(u64::MAX);
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Ownership state of a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Held,
    /// A renewal is in flight. Still owned.
    Renewing,
    /// Ownership ended without a release.
    Lost,
    /// Released voluntarily.
    Released,
}

impl LockState {
    pub fn is_held(self) -> bool {
        matches!(self, LockState::Held | LockState::Renewing)
    }
}

/// Competes for one named lock on behalf of one holder.
#[derive(Clone)]
pub struct Heartbeater {
    store: Arc<dyn KeyedStore>,
    key: String,
    holder_id: String,
    config: LockConfig,
}

impl Heartbeater {
    pub fn new(
        store: Arc<dyn KeyedStore>,
        key: impl Into<String>,
        holder_id: impl Into<String>,
        config: LockConfig,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            holder_id: holder_id.into(),
            config,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn node(&self) -> StoreNode {
        StoreNode::new(self.key.as_str(), self.holder_id.as_bytes())
            .with_ttl(self.config.ttl_secs())
    }

    /// Make a single attempt to take the lock.
    ///
    /// Fails with [`LockError::Contended`] if someone else holds it. A key
    /// already holding our own identifier (left by an earlier run of this
    /// holder) is adopted.
    pub async fn try_acquire(&self) -> LockResult<HeldLock> {
        self.config.validate()?;
        if self.key.is_empty() {
            return Err(LockError::InvalidParameter { field: "key" });
        }
        if self.holder_id.is_empty() {
            return Err(LockError::InvalidParameter { field: "holder_id" });
        }

        let attempted_at = Instant::now();
        match self.store.create(self.node()).await {
            Ok(_) => {}
            Err(StoreError::KeyExists(_)) => self.adopt_or_contend().await?,
            Err(e) => return Err(e.into()),
        }

        info!(key = %self.key, holder_id = %self.holder_id, "Acquired lock");
        Ok(self.spawn_renewal(attempted_at))
    }

    async fn adopt_or_contend(&self) -> LockResult<()> {
        let current = match self.store.get(&self.key).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => {
                return Err(LockError::Contended {
                    key: self.key.clone(),
                    holder: "<expired>".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if current.value != self.holder_id.as_bytes() {
            return Err(LockError::Contended {
                key: self.key.clone(),
                holder: String::from_utf8_lossy(&current.value).into_owned(),
            });
        }

        match self
            .store
            .compare_and_swap(self.holder_id.as_bytes(), self.node())
            .await
        {
            Ok(_) => {
                debug!(key = %self.key, "Adopted lock left by an earlier run");
                Ok(())
            }
            Err(StoreError::KeyNotFound(_) | StoreError::ComparisonFailed(_)) => {
                Err(LockError::Contended {
                    key: self.key.clone(),
                    holder: "<unknown>".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Retry [`try_acquire`](Self::try_acquire) with backoff until the lock
    /// is ours or `shutdown` is signalled.
    ///
    /// Store failures are retried like contention.
    pub async fn acquire(&self, mut shutdown: watch::Receiver<bool>) -> LockResult<HeldLock> {
        info!(key = %self.key, holder_id = %self.holder_id, "Acquiring lock");

        let mut attempt = 0u32;
        loop {
            if *shutdown.borrow() {
                return Err(LockError::Cancelled);
            }

            match self.try_acquire().await {
                Ok(held) => return Ok(held),
                Err(LockError::Contended { holder, .. }) => {
                    debug!(key = %self.key, %holder, attempt, "Lock is held elsewhere");
                }
                Err(LockError::Store(e)) => {
                    warn!(key = %self.key, error = %e, attempt, "Failed to acquire lock");
                }
                Err(e) => return Err(e),
            }

            let delay = self.config.retry_delay(attempt);
            attempt = attempt.saturating_add(1);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(key = %self.key, "Lock acquisition cancelled");
                        return Err(LockError::Cancelled);
                    }
                }
            }
        }
    }

    fn spawn_renewal(&self, acquired_at: Instant) -> HeldLock {
        let (state_tx, state_rx) = watch::channel(LockState::Held);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(self.clone().run_renewal(acquired_at, state_tx, stop_rx));

        HeldLock {
            key: self.key.clone(),
            state: state_rx,
            stop: stop_tx,
            task: Some(task),
        }
    }

    /// Renew until stopped or until ownership is lost.
    async fn run_renewal(
        self,
        acquired_at: Instant,
        state: watch::Sender<LockState>,
        mut stop: watch::Receiver<bool>,
    ) -> LockResult<()> {
        let mut ticker = tokio::time::interval_at(
            acquired_at + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_renewed = acquired_at;
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    state.send_replace(LockState::Renewing);

                    let attempted_at = Instant::now();
                    let deadline = last_renewed + self.config.ttl;
                    let result = tokio::time::timeout_at(
                        deadline,
                        self.store.compare_and_swap(self.holder_id.as_bytes(), self.node()),
                    )
                    .await;

                    match result {
                        Ok(Ok(_)) => {
                            if consecutive_failures > 0 {
                                info!(key = %self.key, consecutive_failures, "Lock renewal recovered");
                            }
                            consecutive_failures = 0;
                            last_renewed = attempted_at;
                            state.send_replace(LockState::Held);
                            debug!(key = %self.key, "Renewed lock");
                        }
                        Ok(Err(StoreError::KeyNotFound(_) | StoreError::ComparisonFailed(_))) => {
                            error!(key = %self.key, holder_id = %self.holder_id, "Lock taken over");
                            state.send_replace(LockState::Lost);
                            return Err(LockError::Lost { key: self.key });
                        }
                        Ok(Err(e)) => {
                            consecutive_failures += 1;
                            if consecutive_failures <= QUIET_FAILURES {
                                warn!(key = %self.key, error = %e, consecutive_failures, "Lock renewal failed");
                            } else {
                                error!(key = %self.key, error = %e, consecutive_failures, "Lock renewal failed repeatedly");
                            }

                            if Instant::now() >= deadline {
                                error!(key = %self.key, "Lock TTL lapsed without renewal");
                                state.send_replace(LockState::Lost);
                                return Err(LockError::Lost { key: self.key });
                            }
                            state.send_replace(LockState::Held);
                        }
                        Err(_) => {
                            error!(key = %self.key, "Lock renewal outlasted the TTL");
                            state.send_replace(LockState::Lost);
                            return Err(LockError::Lost { key: self.key });
                        }
                    }
                }
                _ = tokio::time::sleep_until(last_renewed + self.config.ttl) => {
                    error!(key = %self.key, consecutive_failures, "Lock TTL lapsed without renewal");
                    state.send_replace(LockState::Lost);
                    return Err(LockError::Lost { key: self.key });
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        let result = self.release().await;
                        state.send_replace(LockState::Released);
                        return result;
                    }
                }
            }
        }
    }

    /// Delete the key if it still holds our identifier.
    async fn release(&self) -> LockResult<()> {
        match self
            .store
            .compare_and_delete(&self.key, self.holder_id.as_bytes())
            .await
        {
            Ok(()) => {
                info!(key = %self.key, holder_id = %self.holder_id, "Released lock");
                Ok(())
            }
            Err(StoreError::ComparisonFailed(_)) => {
                warn!(key = %self.key, "Lock was taken over before release");
                Ok(())
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to release lock; it will expire");
                Err(e.into())
            }
        }
    }
}

/// A lock we hold, and the task renewing it.
///
/// Dropping the handle stops renewal and releases the lock in the
/// background. Use [`release`](Self::release) to wait for the release.
pub struct HeldLock {
    key: String,
    state: watch::Receiver<LockState>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<LockResult<()>>>,
}

impl HeldLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> LockState {
        *self.state.borrow()
    }

    pub fn is_held(&self) -> bool {
        self.state().is_held()
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.state.clone()
    }

    /// Wait until the lock is no longer held and return the final state.
    pub async fn wait_lost(&mut self) -> LockState {
        loop {
            let current = *self.state.borrow_and_update();
            if !current.is_held() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return *self.state.borrow();
            }
        }
    }

    /// Stop renewing, release the key, and wait for the renewal task.
    ///
    /// Returns [`LockError::Lost`] if the lock had already been lost.
    pub async fn release(mut self) -> LockResult<()> {
        let _ = self.stop.send(true);
        match self.task.take() {
            Some(task) => task.await.map_err(|e| LockError::Task(e.to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = LockConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.ttl, Duration::from_secs(90));
        assert_eq!(config.retry_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(LockConfig::new(Duration::ZERO), "heartbeat_interval")]
    #[case(LockConfig::new(Duration::from_secs(5)).with_ttl(Duration::from_secs(5)), "ttl")]
    #[case(LockConfig::new(Duration::from_millis(100)).with_ttl(Duration::from_millis(500)), "ttl")]
    #[case(LockConfig::new(Duration::from_secs(1)).with_retry_interval(Duration::ZERO), "retry_interval")]
    fn test_invalid_config(#[case] config: LockConfig, #[case] expected_field: &str) {
        match config.validate() {
            Err(LockError::InvalidParameter { field }) => assert_eq!(field, expected_field),
            other => panic!("expected invalid parameter, got {other:?}"),
        }
    }

    #[test]
    fn test_ttl_secs_rounds_up() {
        let config = LockConfig::new(Duration::from_millis(500));
        assert_eq!(config.ttl, Duration::from_millis(1500));
        assert_eq!(config.ttl_secs(), 2);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let config = LockConfig::new(Duration::from_secs(4));
        let first = config.retry_delay(0);
        assert!(first >= Duration::from_secs(1));
        assert!(first <= Duration::from_millis(1250));

        let late = config.retry_delay(20);
        assert!(late >= Duration::from_secs(4));
        assert!(late <= Duration::from_secs(5));
    }

    #[test]
    fn test_lock_state_is_held() {
        assert!(LockState::Held.is_held());
        assert!(LockState::Renewing.is_held());
        assert!(!LockState::Lost.is_held());
        assert!(!LockState::Released.is_held());
    }
}
