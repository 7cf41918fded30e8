//! The convergence gather: read, validate, prune, and merge.

use std::collections::{HashMap, HashSet};

use bbs_models::{ActualLrpsByProcessGuidAndIndex, CellSet, DesiredLrpsByProcessGuid, DomainSet};
use tracing::{info, instrument, warn};

use crate::lrp::{parse_actual_lrp, parse_desired_lrp};
use crate::paths::{ACTUAL_LRP_SCHEMA_ROOT, DESIRED_LRP_SCHEMA_ROOT};
use crate::{BbsResult, CellsLoader, LrpBbs};

/// A validated snapshot of desired and actual state.
///
/// The four parts are read separately and may reflect slightly different
/// moments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceInput {
    /// Every process guid with a desired LRP, an actual LRP, or both.
    pub all_process_guids: HashSet<String>,
    pub desired_lrps: DesiredLrpsByProcessGuid,
    pub actual_lrps: ActualLrpsByProcessGuidAndIndex,
    pub domains: DomainSet,
    pub cells: CellSet,
}

impl ConvergenceInput {
    /// Process guids that have actual LRPs but no desired LRP.
    pub fn orphaned_process_guids(&self) -> HashSet<&str> {
        self.actual_lrps
            .keys()
            .filter(|guid| !self.desired_lrps.contains_key(*guid))
            .map(String::as_str)
            .collect()
    }

    pub fn has_cell(&self, cell_id: &str) -> bool {
        self.cells.contains_key(cell_id)
    }

    /// Total number of actual LRPs across all processes.
    pub fn actual_lrp_count(&self) -> usize {
        self.actual_lrps.values().map(HashMap::len).sum()
    }
}

impl LrpBbs {
    /// Build a [`ConvergenceInput`], deleting invalid LRP records on the way.
    ///
    /// A store failure on any read aborts the gather. Invalid records never
    /// do; they are pruned and left out of the snapshot.
    #[instrument(skip_all)]
    pub async fn gather_and_prune_lrp_convergence_input(
        &self,
        cells_loader: &dyn CellsLoader,
    ) -> BbsResult<ConvergenceInput> {
        let desired_lrps = self.gather_and_prune_desired_lrps().await?;
        let actual_lrps = self.gather_and_prune_actual_lrps().await?;
        let domains = self.domains.domains().await?;
        let cells = cells_loader.load_cells().await?;

        let all_process_guids = desired_lrps
            .keys()
            .chain(actual_lrps.keys())
            .cloned()
            .collect();

        let input = ConvergenceInput {
            all_process_guids,
            desired_lrps,
            actual_lrps,
            domains,
            cells,
        };

        info!(
            process_guids = input.all_process_guids.len(),
            desired_lrps = input.desired_lrps.len(),
            actual_lrps = input.actual_lrp_count(),
            domains = input.domains.len(),
            cells = input.cells.len(),
            "Gathered convergence input"
        );

        Ok(input)
    }

    async fn gather_and_prune_desired_lrps(&self) -> BbsResult<DesiredLrpsByProcessGuid> {
        let nodes = self.store.list_recursively(DESIRED_LRP_SCHEMA_ROOT).await?;

        let mut desired_lrps = DesiredLrpsByProcessGuid::with_capacity(nodes.len());
        let mut invalid = Vec::new();
        for node in nodes {
            match parse_desired_lrp(&node) {
                Ok(lrp) => {
                    desired_lrps.insert(lrp.process_guid.clone(), lrp);
                }
                Err(error) => {
                    warn!(key = %node.key, %error, "Found invalid desired LRP");
                    invalid.push(node.key);
                }
            }
        }

        if !invalid.is_empty() {
            let pruned = self.prune(&invalid).await;
            info!(found = invalid.len(), pruned, "Pruned invalid desired LRPs");
        }
        Ok(desired_lrps)
    }

    async fn gather_and_prune_actual_lrps(&self) -> BbsResult<ActualLrpsByProcessGuidAndIndex> {
        let nodes = self.store.list_recursively(ACTUAL_LRP_SCHEMA_ROOT).await?;

        let mut actual_lrps = ActualLrpsByProcessGuidAndIndex::new();
        let mut invalid = Vec::new();
        for node in nodes {
            match parse_actual_lrp(&node) {
                Ok(lrp) => {
                    actual_lrps
                        .entry(lrp.process_guid().to_string())
                        .or_default()
                        .insert(lrp.index(), lrp);
                }
                Err(error) => {
                    warn!(key = %node.key, %error, "Found invalid actual LRP");
                    invalid.push(node.key);
                }
            }
        }

        if !invalid.is_empty() {
            let pruned = self.prune(&invalid).await;
            info!(found = invalid.len(), pruned, "Pruned invalid actual LRPs");
        }
        Ok(actual_lrps)
    }
}
