//! # bbs-store
//!
//! The hierarchical key/value store the bulletin board is built on.
//!
//! ## Contract
//!
//! - Keys are `/`-separated paths; listing a prefix returns every live leaf
//!   below it
//! - Every write assigns a store-wide, strictly increasing modification index
//! - A key written with a non-zero TTL disappears once it expires; expired
//!   keys are invisible to reads and do not block `create`
//! - `create` and `compare_and_swap` are atomic, and are the only ordering
//!   primitives callers may rely on
//! - `delete` is idempotent
//!
//! Two backends are provided: [`MemoryStore`], an in-process fake for tests,
//! and [`SqliteStore`], a durable single-host store.

mod error;
mod memory;
mod node;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use node::{KeyedStore, StoreNode};
pub use sqlite::SqliteStore;
