//! Desired and actual LRP records.
//!
//! Reads here never prune; pruning happens only during a convergence gather
//! (see `convergence.rs`).

use std::collections::HashMap;
use std::sync::Arc;

use bbs_models::{ActualLrp, DesiredLrp, ModelError, Record};
use bbs_store::{KeyedStore, StoreNode};
use tracing::{debug, warn};

use crate::paths::{
    actual_lrp_process_dir, actual_lrp_schema_path, desired_lrp_schema_path,
    parse_actual_lrp_path, parse_desired_lrp_path, DESIRED_LRP_SCHEMA_ROOT,
};
use crate::{BbsError, BbsResult, DomainBbs};

#[derive(Clone)]
pub struct LrpBbs {
    pub(crate) store: Arc<dyn KeyedStore>,
    pub(crate) domains: DomainBbs,
}

impl LrpBbs {
    pub fn new(store: Arc<dyn KeyedStore>, domains: DomainBbs) -> Self {
        Self { store, domains }
    }

    /// All valid desired LRPs. Invalid records are skipped.
    pub async fn desired_lrps(&self) -> BbsResult<Vec<DesiredLrp>> {
        let nodes = self.store.list_recursively(DESIRED_LRP_SCHEMA_ROOT).await?;
        let mut lrps = Vec::with_capacity(nodes.len());
        for node in &nodes {
            match parse_desired_lrp(node) {
                Ok(lrp) => lrps.push(lrp),
                Err(error) => warn!(key = %node.key, %error, "Skipping invalid desired LRP"),
            }
        }
        Ok(lrps)
    }

    pub async fn desired_lrp_by_process_guid(&self, process_guid: &str) -> BbsResult<DesiredLrp> {
        validate_process_guid(process_guid)?;
        let key = desired_lrp_schema_path(process_guid);
        let node = self.store.get(&key).await.map_err(BbsError::from_lookup)?;
        parse_desired_lrp(&node).map_err(|source| BbsError::InvalidRecord { key, source })
    }

    /// Valid actual LRPs for one process, keyed by index.
    pub async fn actual_lrps_by_process_guid(
        &self,
        process_guid: &str,
    ) -> BbsResult<HashMap<i32, ActualLrp>> {
        validate_process_guid(process_guid)?;
        let nodes = self
            .store
            .list_recursively(&actual_lrp_process_dir(process_guid))
            .await?;

        let mut lrps = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            match parse_actual_lrp(node) {
                Ok(lrp) if lrp.process_guid() == process_guid => {
                    lrps.insert(lrp.index(), lrp);
                }
                Ok(lrp) => warn!(
                    key = %node.key,
                    found = lrp.process_guid(),
                    "Skipping actual LRP for another process"
                ),
                Err(error) => warn!(key = %node.key, %error, "Skipping invalid actual LRP"),
            }
        }
        Ok(lrps)
    }

    pub async fn actual_lrp_by_process_guid_and_index(
        &self,
        process_guid: &str,
        index: i32,
    ) -> BbsResult<ActualLrp> {
        validate_process_guid(process_guid)?;
        if index < 0 {
            return Err(BbsError::InvalidParameter { field: "index" });
        }
        let key = actual_lrp_schema_path(process_guid, index);
        let node = self.store.get(&key).await.map_err(BbsError::from_lookup)?;
        parse_actual_lrp(&node).map_err(|source| BbsError::InvalidRecord { key, source })
    }

    /// Delete `keys`, logging and skipping any delete that fails.
    ///
    /// Returns how many deletes succeeded.
    pub(crate) async fn prune(&self, keys: &[String]) -> usize {
        let mut pruned = 0;
        for key in keys {
            match self.store.delete(key).await {
                Ok(()) => {
                    debug!(%key, "Pruned invalid record");
                    pruned += 1;
                }
                Err(error) => warn!(%key, %error, "Failed to prune invalid record"),
            }
        }
        pruned
    }
}

/// A process guid is one non-empty key segment.
fn validate_process_guid(process_guid: &str) -> BbsResult<()> {
    if process_guid.is_empty() || process_guid.contains('/') {
        return Err(BbsError::InvalidParameter {
            field: "process_guid",
        });
    }
    Ok(())
}

/// Decode a desired LRP and check it sits under its own process guid.
pub(crate) fn parse_desired_lrp(node: &StoreNode) -> Result<DesiredLrp, ModelError> {
    let lrp = DesiredLrp::from_json(&node.value)?;
    match parse_desired_lrp_path(&node.key) {
        Some(guid) if guid == lrp.process_guid => Ok(lrp),
        _ => Err(ModelError::InvalidField("process_guid".to_string())),
    }
}

/// Decode an actual LRP and check it sits under its own guid and index.
pub(crate) fn parse_actual_lrp(node: &StoreNode) -> Result<ActualLrp, ModelError> {
    let lrp = ActualLrp::from_json(&node.value)?;
    match parse_actual_lrp_path(&node.key) {
        Some((guid, _)) if guid != lrp.process_guid() => {
            Err(ModelError::InvalidField("process_guid".to_string()))
        }
        Some((_, index)) if index != lrp.index() => {
            Err(ModelError::InvalidField("index".to_string()))
        }
        Some(_) => Ok(lrp),
        None => Err(ModelError::InvalidField("index".to_string())),
    }
}
