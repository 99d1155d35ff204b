/*
 * Contentgraph Core - Content Pack Graph Engine
 *
 * Layered layout:
 * - shared/  : Common models (ContentNode, Relationship, Marketplace, errors)
 * - schema/  : Static registry of node/relationship constraints
 * - parsers/ : Content item parsers and the pack parser
 * - graph/   : Store port, loader, propagation engine, pack dependency graph,
 *              in-memory reference backend
 * - build/   : Build driver and configuration
 *
 * A build parses a tree of pack directories into typed node/relationship
 * batches (parallel per pack), commits them through the store port in the
 * order the merge semantics require, prunes per-marketplace membership to a
 * fixpoint, and derives pack-level DEPENDS_ON edges from item-level USES
 * edges.
 */

pub mod build;
pub mod graph;
pub mod parsers;
pub mod schema;
pub mod shared;

pub use build::{BuildConfig, BuildReport, ContentGraphBuilder, ParsePolicy};
pub use graph::{
    CommitSummary, ContentGraphStore, DependencyConfig, GraphLoader, GraphStats,
    InMemoryGraphStore, MarketplacePropagation, MarketplacePropagator, PackDependency,
    PackDependencyGraph, PropagationReport, RetryPolicy, DEFAULT_IGNORED_PACKS,
};
pub use parsers::{ContentFolder, ItemParser, PackGraph, PackMetadata, PackParser};
pub use schema::{NodeSchema, RelationshipSchema, SchemaRegistry};
pub use shared::models::{
    node_id_of, split_node_id, ContentNode, ContentType, ErrorCategory, ErrorKind, GraphError,
    Marketplace, MarketplaceSet, NodeId, PackError, Relationship, RelationshipKind, Result,
    StoredRelationship, DEFAULT_FROMVERSION, DEFAULT_TOVERSION,
};
