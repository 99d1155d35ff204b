//! Marketplace propagation engine.
//!
//! A single pruning pass can expose second-order breakage: removing a
//! marketplace from a node may invalidate nodes that mandatorily depend on
//! it. The engine therefore re-runs passes until one reports zero changes.
//! Termination is guaranteed because passes only remove tags (shrinkage is
//! monotonic); a safety bound still guards against a misbehaving backend.

use tracing::info;

use super::ports::ContentGraphStore;
use crate::shared::models::{GraphError, Marketplace, Result};

/// Outcome of propagating one marketplace to fixpoint.
#[derive(Debug, Clone, Copy)]
pub struct MarketplacePropagation {
    pub marketplace: Marketplace,
    /// Passes executed, including the final zero-change pass.
    pub passes: usize,
    /// Nodes that lost the marketplace tag, over all passes.
    pub removed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PropagationReport {
    pub marketplaces: Vec<MarketplacePropagation>,
}

impl PropagationReport {
    pub fn total_removed(&self) -> usize {
        self.marketplaces.iter().map(|m| m.removed).sum()
    }
}

pub struct MarketplacePropagator<'a, S: ContentGraphStore> {
    store: &'a S,
}

impl<'a, S: ContentGraphStore> MarketplacePropagator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Run passes for one marketplace until a pass changes nothing.
    pub async fn propagate(
        &self,
        marketplace: Marketplace,
        max_passes: usize,
    ) -> Result<MarketplacePropagation> {
        let mut passes = 0;
        let mut removed = 0;
        loop {
            let changed = self.store.run_marketplace_pass(marketplace).await?;
            passes += 1;
            removed += changed;
            if changed == 0 {
                break;
            }
            if passes > max_passes {
                return Err(GraphError::internal(format!(
                    "marketplace {marketplace} pruning did not converge within {max_passes} passes"
                )));
            }
        }
        info!(marketplace = %marketplace, passes, removed, "propagation reached fixpoint");
        Ok(MarketplacePropagation {
            marketplace,
            passes,
            removed,
        })
    }

    /// Propagate every given marketplace to fixpoint, sequentially.
    ///
    /// Passes within one marketplace depend on each other; across
    /// marketplaces they are independent, so order does not matter.
    pub async fn propagate_all(&self, marketplaces: &[Marketplace]) -> Result<PropagationReport> {
        // Shrinkage removes at most one tag per node per pass, so the node
        // count bounds the number of productive passes.
        let max_passes = self.store.stats().await?.total_nodes + 1;

        let mut report = PropagationReport::default();
        for marketplace in marketplaces {
            report
                .marketplaces
                .push(self.propagate(*marketplace, max_passes).await?);
        }
        Ok(report)
    }
}
