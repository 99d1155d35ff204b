//! Graph store port.
//!
//! Any graph-capable backend can sit behind this trait: an embedded map
//! structure, relational tables with adjacency lists, or an external graph
//! engine. What the contract pins down is create-or-update-by-key semantics
//! for nodes, merge semantics with OR/union folding for relationships, and
//! the marketplace pass / dependency aggregation operations the engines
//! drive.

use std::collections::HashMap;

use ahash::AHashSet;
use async_trait::async_trait;

use crate::shared::models::{
    ContentNode, ContentType, Marketplace, Relationship, RelationshipKind, Result,
    StoredRelationship,
};

/// Infrastructure packs that never participate in dependency accounting.
pub const DEFAULT_IGNORED_PACKS: [&str; 3] = ["NonSupported", "Base", "ApiModules"];

/// Configuration handed to the dependency aggregator.
#[derive(Debug, Clone)]
pub struct DependencyConfig {
    /// Pack ids excluded from `DEPENDS_ON` derivation, on either end.
    pub ignored_packs: AHashSet<String>,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            ignored_packs: DEFAULT_IGNORED_PACKS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DependencyConfig {
    pub fn with_ignored<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored_packs: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_ignored(&self, pack_id: &str) -> bool {
        self.ignored_packs.contains(pack_id)
    }
}

/// Node and relationship counts, by kind.
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub nodes_by_type: HashMap<ContentType, usize>,
    pub relationships_by_kind: HashMap<RelationshipKind, usize>,
}

/// Content graph storage abstraction.
///
/// All backends must implement this trait. Mutating operations are
/// transactional per call: a batch either applies fully or not at all.
#[async_trait]
pub trait ContentGraphStore: Send + Sync {
    /// Idempotently declare indexes and constraints from the schema registry.
    async fn ensure_schema(&self) -> Result<()>;

    /// Bulk create-or-update nodes of one kind, matched by `node_id`.
    ///
    /// On match, scalar properties are replaced and new attribute keys
    /// overwrite old ones. Returns the number of records applied.
    async fn upsert_nodes(&self, content_type: ContentType, nodes: Vec<ContentNode>)
        -> Result<usize>;

    /// Bulk merge relationship records of one kind.
    ///
    /// Edges are unique per `(source, kind, target)`; re-merging folds
    /// `mandatorily`/`deprecated` by OR. `HAS_COMMAND` merge-creates its
    /// target `Command` node, seeding its marketplaces from the source on
    /// create and unioning on match. Records whose endpoints cannot be
    /// resolved (or whose target shares no marketplace with the source, for
    /// the dependency kinds) are skipped. Returns the number of edges
    /// touched.
    async fn upsert_relationships(
        &self,
        kind: RelationshipKind,
        relationships: Vec<Relationship>,
    ) -> Result<usize>;

    /// One pruning pass for the given marketplace.
    ///
    /// Removes the marketplace tag from every node that has a mandatory
    /// `USES` dependency unavailable there with no substitutable alternative.
    /// Removals are computed against the pre-pass state. Returns the number
    /// of changed nodes; callers drive this to fixpoint.
    async fn run_marketplace_pass(&self, marketplace: Marketplace) -> Result<usize>;

    /// Derive pack-level `DEPENDS_ON` edges from item-level `USES` edges.
    ///
    /// Returns the number of newly created edges (merges into existing edges
    /// don't count).
    async fn run_dependency_aggregation(&self, config: &DependencyConfig) -> Result<usize>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Read surface
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn get_node(&self, node_id: &str) -> Result<Option<ContentNode>>;

    /// All nodes of a kind, ordered by `node_id`.
    async fn nodes_by_type(&self, content_type: ContentType) -> Result<Vec<ContentNode>>;

    /// All committed edges of a kind, ordered by `(source, target)`.
    async fn relationships_of_kind(&self, kind: RelationshipKind)
        -> Result<Vec<StoredRelationship>>;

    async fn stats(&self) -> Result<GraphStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ignore_list() {
        let config = DependencyConfig::default();
        assert!(config.is_ignored("Base"));
        assert!(config.is_ignored("NonSupported"));
        assert!(config.is_ignored("ApiModules"));
        assert!(!config.is_ignored("CommonScripts"));
    }
}
