//! Store nodes and the store interface.

use async_trait::async_trait;

use crate::StoreResult;

/// A single key with its value and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNode {
    pub key: String,
    pub value: Vec<u8>,
    /// Seconds until expiry, counted from the last write. Zero never expires.
    pub ttl: u64,
    /// Modification index assigned by the store on the last write.
    pub index: u64,
}

impl StoreNode {
    /// A node without a TTL.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: 0,
            index: 0,
        }
    }

    /// Set the TTL in seconds.
    #[must_use]
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Keyed TTL store interface.
///
/// Implementations must be safe to share across tasks; every method is a
/// single remote round trip from the caller's point of view.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Create a key, failing with `KeyExists` if a live key is present.
    async fn create(&self, node: StoreNode) -> StoreResult<StoreNode>;

    /// Write a key unconditionally, resetting its TTL.
    async fn set(&self, node: StoreNode) -> StoreResult<StoreNode>;

    /// Replace a key only if its current value equals `prev_value`.
    ///
    /// Fails with `KeyNotFound` if there is no live key, or
    /// `ComparisonFailed` if the value differs.
    async fn compare_and_swap(&self, prev_value: &[u8], node: StoreNode)
        -> StoreResult<StoreNode>;

    /// Read a single key.
    async fn get(&self, key: &str) -> StoreResult<StoreNode>;

    /// Read every live key below `prefix`. Returns an empty list when there
    /// are none.
    async fn list_recursively(&self, prefix: &str) -> StoreResult<Vec<StoreNode>>;

    /// Delete a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Delete a key only if its current value equals `prev_value`.
    ///
    /// A missing key succeeds; a different value fails with
    /// `ComparisonFailed`.
    async fn compare_and_delete(&self, key: &str, prev_value: &[u8]) -> StoreResult<()>;
}

/// Normalize a listing prefix to `"<prefix>/"`.
pub(crate) fn subtree_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}
