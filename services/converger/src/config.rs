//! Configuration for the converger.

use std::time::Duration;

use anyhow::{Context, Result};
use bbs::LockConfig;

/// Converger configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier written into the converge lock while we hold it.
    pub converger_id: String,

    /// SQLite database path, or `:memory:`.
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Converge lock timing.
    pub lock: LockConfig,

    /// Seconds between convergence gathers.
    pub convergence_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secs = |name: &str| -> Result<Option<u64>> {
            var(name)
                .map(|v| v.parse().with_context(|| format!("{name} must be a number of seconds")))
                .transpose()
        };

        // Pinning the id lets a restarted converger adopt its own unexpired lock.
        let converger_id = var("BBS_CONVERGER_ID").unwrap_or_else(|| ulid::Ulid::new().to_string());

        let db_path = var("BBS_DB_PATH").unwrap_or_else(|| "/var/lib/bbs/bbs.db".to_string());

        let log_level = var("BBS_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let heartbeat_interval = secs("BBS_HEARTBEAT_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(bbs::HEARTBEAT_INTERVAL);
        let mut lock = LockConfig::new(heartbeat_interval);
        if let Some(ttl) = secs("BBS_LOCK_TTL_SECS")? {
            lock = lock.with_ttl(Duration::from_secs(ttl));
        }
        lock.validate().context("invalid lock timing")?;

        let convergence_interval_secs = secs("BBS_CONVERGENCE_INTERVAL_SECS")?.unwrap_or(30);
        if convergence_interval_secs == 0 {
            anyhow::bail!("BBS_CONVERGENCE_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            converger_id,
            db_path,
            log_level,
            lock,
            convergence_interval_secs,
        })
    }

    pub fn convergence_interval(&self) -> Duration {
        Duration::from_secs(self.convergence_interval_secs)
    }
}
