//! # bbs
//!
//! The state-reconciliation core of the bulletin board.
//!
//! - [`DomainBbs`]: TTL-backed domain freshness markers
//! - [`LrpBbs`]: desired/actual LRP lookups and the convergence gatherer
//! - [`CellsLoader`]: the injected view of live cells
//! - [`LockBbs`] and [`Heartbeater`]: TTL-key mutual exclusion for singleton roles
//!
//! Every component takes its store as an explicit `Arc<dyn KeyedStore>`, so
//! an in-memory store can stand in for the real one in tests.

pub mod paths;

mod cells;
mod convergence;
mod domain;
mod error;
mod heartbeat;
mod lock;
mod lrp;

use std::sync::Arc;

use bbs_store::KeyedStore;

pub use cells::{CellsLoader, StoreCellsLoader};
pub use convergence::ConvergenceInput;
pub use domain::DomainBbs;
pub use error::{BbsError, BbsResult};
pub use heartbeat::{
    HeldLock, Heartbeater, LockConfig, LockError, LockResult, LockState, HEARTBEAT_INTERVAL,
};
pub use lock::*;
pub use lrp::LrpBbs;

/// All bulletin board components sharing one store.
#[derive(Clone)]
pub struct Bbs {
    pub domains: DomainBbs,
    pub lrps: LrpBbs,
    pub locks: LockBbs,
    store: Arc<dyn KeyedStore>,
}

impl Bbs {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        let domains = DomainBbs::new(Arc::clone(&store));
        let lrps = LrpBbs::new(Arc::clone(&store), domains.clone());
        let locks = LockBbs::new(Arc::clone(&store));
        Self {
            domains,
            lrps,
            locks,
            store,
        }
    }

    /// A cells loader reading presence records from this store.
    ///
    /// The loader memoizes its first result, so use a fresh one per gather.
    pub fn new_cells_loader(&self) -> StoreCellsLoader {
        StoreCellsLoader::new(Arc::clone(&self.store))
    }
}
