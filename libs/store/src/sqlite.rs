//! SQLite-backed store.
//!
//! Every key lives in one `nodes` table. Expiry is stored as an absolute Unix
//! millisecond timestamp; expired rows are filtered out of reads and purged
//! before writes. The modification index is a single counter row bumped inside
//! the same transaction as the write it stamps.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::node::subtree_prefix;
use crate::{KeyedStore, StoreError, StoreNode, StoreResult};

const LIVE: &str = "(expires_at IS NULL OR expires_at > ?)";

/// Durable store on a local SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::init(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_index INTEGER NOT NULL DEFAULT 0
            );

            INSERT OR IGNORE INTO store_meta (id) VALUES (1);

            CREATE TABLE IF NOT EXISTS nodes (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                ttl INTEGER NOT NULL DEFAULT 0,
                modified_index INTEGER NOT NULL,
                expires_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_expires_at ON nodes(expires_at);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn purge_expired(tx: &Transaction<'_>) -> StoreResult<()> {
    tx.execute(
        "DELETE FROM nodes WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        params![now_millis()],
    )?;
    Ok(())
}

fn current_value(tx: &Transaction<'_>, key: &str) -> StoreResult<Option<Vec<u8>>> {
    let value = tx
        .query_row(
            "SELECT value FROM nodes WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Write `node` and stamp it with the next modification index.
fn write_node(tx: &Transaction<'_>, node: &StoreNode) -> StoreResult<StoreNode> {
    tx.execute(
        "UPDATE store_meta SET last_index = last_index + 1 WHERE id = 1",
        [],
    )?;
    let index: i64 = tx.query_row(
        "SELECT last_index FROM store_meta WHERE id = 1",
        [],
        |row| row.get(0),
    )?;

    let expires_at = (node.ttl > 0)
        .then(|| now_millis().saturating_add(to_i64(node.ttl).saturating_mul(1000)));

    tx.execute(
        r#"
        INSERT INTO nodes (key, value, ttl, modified_index, expires_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            ttl = excluded.ttl,
            modified_index = excluded.modified_index,
            expires_at = excluded.expires_at
        "#,
        params![node.key, node.value, to_i64(node.ttl), index, expires_at],
    )?;

    Ok(StoreNode {
        key: node.key.clone(),
        value: node.value.clone(),
        ttl: node.ttl,
        index: to_u64(index),
    })
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreNode> {
    let ttl: i64 = row.get(2)?;
    let index: i64 = row.get(3)?;
    Ok(StoreNode {
        key: row.get(0)?,
        value: row.get(1)?,
        ttl: to_u64(ttl),
        index: to_u64(index),
    })
}

#[async_trait]
impl KeyedStore for SqliteStore {
    async fn create(&self, node: StoreNode) -> StoreResult<StoreNode> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            purge_expired(&tx)?;
            if current_value(&tx, &node.key)?.is_some() {
                return Err(StoreError::KeyExists(node.key));
            }
            let written = write_node(&tx, &node)?;
            tx.commit()?;
            Ok(written)
        })
        .await
    }

    async fn set(&self, node: StoreNode) -> StoreResult<StoreNode> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let written = write_node(&tx, &node)?;
            tx.commit()?;
            Ok(written)
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        prev_value: &[u8],
        node: StoreNode,
    ) -> StoreResult<StoreNode> {
        let prev_value = prev_value.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            purge_expired(&tx)?;
            match current_value(&tx, &node.key)? {
                None => return Err(StoreError::KeyNotFound(node.key)),
                Some(value) if value != prev_value => {
                    return Err(StoreError::ComparisonFailed(node.key))
                }
                Some(_) => {}
            }
            let written = write_node(&tx, &node)?;
            tx.commit()?;
            Ok(written)
        })
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<StoreNode> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT key, value, ttl, modified_index FROM nodes WHERE key = ? AND {LIVE}"
            );
            let node = conn
                .query_row(&sql, params![key, now_millis()], row_to_node)
                .optional()?;
            node.ok_or(StoreError::KeyNotFound(key))
        })
        .await
    }

    async fn list_recursively(&self, prefix: &str) -> StoreResult<Vec<StoreNode>> {
        let prefix = subtree_prefix(prefix);
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT key, value, ttl, modified_index FROM nodes
                 WHERE substr(key, 1, length(?1)) = ?1 AND {}
                 ORDER BY key",
                LIVE.replace('?', "?2")
            );
            let mut stmt = conn.prepare(&sql)?;
            let nodes = stmt
                .query_map(params![prefix, now_millis()], row_to_node)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(nodes)
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM nodes WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn compare_and_delete(&self, key: &str, prev_value: &[u8]) -> StoreResult<()> {
        let key = key.to_string();
        let prev_value = prev_value.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            purge_expired(&tx)?;
            if let Some(value) = current_value(&tx, &key)? {
                if value != prev_value {
                    return Err(StoreError::ComparisonFailed(key));
                }
                tx.execute("DELETE FROM nodes WHERE key = ?1", params![key])?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
