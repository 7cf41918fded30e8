//! Cell inventory access.

use std::sync::Arc;

use async_trait::async_trait;
use bbs_models::{CellPresence, CellSet, Record};
use bbs_store::KeyedStore;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::paths::CELL_SCHEMA_ROOT;
use crate::BbsResult;

/// Read-only view of the cells that are currently alive.
#[async_trait]
pub trait CellsLoader: Send + Sync {
    async fn load_cells(&self) -> BbsResult<CellSet>;
}

/// Loads cell presences from the `/v1/cell` subtree.
///
/// The first successful load is memoized for the lifetime of the loader.
pub struct StoreCellsLoader {
    store: Arc<dyn KeyedStore>,
    cells: OnceCell<CellSet>,
}

impl StoreCellsLoader {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self {
            store,
            cells: OnceCell::new(),
        }
    }

    async fn fetch(&self) -> BbsResult<CellSet> {
        let nodes = self.store.list_recursively(CELL_SCHEMA_ROOT).await?;

        let mut cells = CellSet::with_capacity(nodes.len());
        for node in &nodes {
            // Cells own their presence keys, so bad ones are skipped but left alone.
            match CellPresence::from_json(&node.value) {
                Ok(cell) => {
                    cells.insert(cell.cell_id.clone(), cell);
                }
                Err(error) => warn!(key = %node.key, %error, "Ignoring invalid cell presence"),
            }
        }
        Ok(cells)
    }
}

#[async_trait]
impl CellsLoader for StoreCellsLoader {
    async fn load_cells(&self) -> BbsResult<CellSet> {
        let cells = self.cells.get_or_try_init(|| self.fetch()).await?;
        Ok(cells.clone())
    }
}
