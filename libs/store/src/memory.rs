//! In-process store for tests and development.
//!
//! Expiry is measured on the tokio clock, so tests running with paused time
//! can advance past a TTL without sleeping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::node::subtree_prefix;
use crate::{KeyedStore, StoreError, StoreNode, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: u64,
    index: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn to_node(&self, key: &str) -> StoreNode {
        StoreNode {
            key: key.to_string(),
            value: self.value.clone(),
            ttl: self.ttl,
            index: self.index,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    last_index: u64,
}

impl Inner {
    fn live(&self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        self.entries.get(key).filter(|e| e.is_live(now))
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    fn write(&mut self, node: &StoreNode) -> StoreNode {
        self.purge_expired();
        self.last_index += 1;
        let expires_at = (node.ttl > 0).then(|| Instant::now() + Duration::from_secs(node.ttl));
        let entry = Entry {
            value: node.value.clone(),
            ttl: node.ttl,
            index: self.last_index,
            expires_at,
        };
        let written = entry.to_node(&node.key);
        self.entries.insert(node.key.clone(), entry);
        written
    }
}

/// Mock store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,

    /// Whether every operation should fail as if the store were unreachable.
    unavailable: AtomicBool,

    /// Whether deletes should fail as if the store were unreachable.
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make deletes fail while reads and writes keep working.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))
    }

    fn lock_for_delete(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store rejected delete".to_string()));
        }
        self.lock()
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn create(&self, node: StoreNode) -> StoreResult<StoreNode> {
        let mut inner = self.lock()?;
        if inner.live(&node.key).is_some() {
            return Err(StoreError::KeyExists(node.key));
        }
        Ok(inner.write(&node))
    }

    async fn set(&self, node: StoreNode) -> StoreResult<StoreNode> {
        let mut inner = self.lock()?;
        Ok(inner.write(&node))
    }

    async fn compare_and_swap(
        &self,
        prev_value: &[u8],
        node: StoreNode,
    ) -> StoreResult<StoreNode> {
        let mut inner = self.lock()?;
        let matches = inner.live(&node.key).map(|entry| entry.value == prev_value);
        match matches {
            None => Err(StoreError::KeyNotFound(node.key)),
            Some(false) => Err(StoreError::ComparisonFailed(node.key)),
            Some(true) => Ok(inner.write(&node)),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<StoreNode> {
        let inner = self.lock()?;
        inner
            .live(key)
            .map(|entry| entry.to_node(key))
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    async fn list_recursively(&self, prefix: &str) -> StoreResult<Vec<StoreNode>> {
        let inner = self.lock()?;
        let prefix = subtree_prefix(prefix);
        let now = Instant::now();

        Ok(inner
            .entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, entry)| entry.to_node(key))
            .collect())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.lock_for_delete()?;
        inner.entries.remove(key);
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, prev_value: &[u8]) -> StoreResult<()> {
        let mut inner = self.lock_for_delete()?;
        let matches = inner.live(key).map(|entry| entry.value == prev_value);
        if matches == Some(false) {
            return Err(StoreError::ComparisonFailed(key.to_string()));
        }
        inner.entries.remove(key);
        Ok(())
    }
}
