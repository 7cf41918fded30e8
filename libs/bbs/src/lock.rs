//! Named locks for singleton roles.

use std::sync::Arc;

use bbs_store::KeyedStore;

use crate::paths::lock_schema_path;
use crate::{Heartbeater, LockConfig};

pub const AUCTIONEER_LOCK: &str = "auctioneer_lock";
pub const CONVERGE_LOCK: &str = "converge_lock";
pub const NSYNC_BULKER_LOCK: &str = "nsync_bulker_lock";
pub const NSYNC_LISTENER_LOCK: &str = "nsync_listener_lock";
pub const ROUTE_EMITTER_LOCK: &str = "route_emitter_lock";

/// Builds heartbeaters for locks under `/v1/locks`.
///
/// Each lock name is independent of every other.
#[derive(Clone)]
pub struct LockBbs {
    store: Arc<dyn KeyedStore>,
}

impl LockBbs {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub fn new_lock(
        &self,
        lock_name: &str,
        holder_id: impl Into<String>,
        config: LockConfig,
    ) -> Heartbeater {
        Heartbeater::new(
            Arc::clone(&self.store),
            lock_schema_path(lock_name),
            holder_id,
            config,
        )
    }

    pub fn new_auctioneer_lock(
        &self,
        auctioneer_id: impl Into<String>,
        config: LockConfig,
    ) -> Heartbeater {
        self.new_lock(AUCTIONEER_LOCK, auctioneer_id, config)
    }

    pub fn new_converge_lock(
        &self,
        converger_id: impl Into<String>,
        config: LockConfig,
    ) -> Heartbeater {
        self.new_lock(CONVERGE_LOCK, converger_id, config)
    }

    pub fn new_nsync_bulker_lock(
        &self,
        bulker_id: impl Into<String>,
        config: LockConfig,
    ) -> Heartbeater {
        self.new_lock(NSYNC_BULKER_LOCK, bulker_id, config)
    }

    pub fn new_nsync_listener_lock(
        &self,
        listener_id: impl Into<String>,
        config: LockConfig,
    ) -> Heartbeater {
        self.new_lock(NSYNC_LISTENER_LOCK, listener_id, config)
    }

    pub fn new_route_emitter_lock(
        &self,
        emitter_id: impl Into<String>,
        config: LockConfig,
    ) -> Heartbeater {
        self.new_lock(ROUTE_EMITTER_LOCK, emitter_id, config)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bbs_store::MemoryStore;

    use super::*;

    fn lock_bbs() -> (Arc<MemoryStore>, LockBbs) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), LockBbs::new(store))
    }

    #[test]
    fn test_role_lock_keys() {
        let (_store, bbs) = lock_bbs();
        let config = LockConfig::default();

        let cases = [
            (bbs.new_auctioneer_lock("id", config), "/v1/locks/auctioneer_lock"),
            (bbs.new_converge_lock("id", config), "/v1/locks/converge_lock"),
            (bbs.new_nsync_bulker_lock("id", config), "/v1/locks/nsync_bulker_lock"),
            (bbs.new_nsync_listener_lock("id", config), "/v1/locks/nsync_listener_lock"),
            (bbs.new_route_emitter_lock("id", config), "/v1/locks/route_emitter_lock"),
        ];
        for (heartbeater, key) in cases {
            assert_eq!(heartbeater.key(), key);
            assert_eq!(heartbeater.holder_id(), "id");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_locks_are_independent() {
        let (store, bbs) = lock_bbs();
        let config = LockConfig::new(Duration::from_secs(1));

        let converge = bbs.new_converge_lock("converger-1", config).try_acquire().await.unwrap();
        let auctioneer = bbs
            .new_auctioneer_lock("auctioneer-1", config)
            .try_acquire()
            .await
            .unwrap();

        assert_eq!(store.get("/v1/locks/converge_lock").await.unwrap().value, b"converger-1");
        assert_eq!(store.get("/v1/locks/auctioneer_lock").await.unwrap().value, b"auctioneer-1");

        converge.release().await.unwrap();
        assert!(auctioneer.is_held());
        assert!(store.get("/v1/locks/converge_lock").await.unwrap_err().is_not_found());
    }
}
