//! Graph layer: store port, loader, propagation, aggregation output.

pub mod loader;
pub mod memory_store;
pub mod pack_graph;
pub mod ports;
pub mod propagation;

pub use loader::{CommitSummary, GraphLoader, RetryPolicy};
pub use memory_store::InMemoryGraphStore;
pub use pack_graph::{PackDependency, PackDependencyGraph};
pub use ports::{ContentGraphStore, DependencyConfig, GraphStats, DEFAULT_IGNORED_PACKS};
pub use propagation::{MarketplacePropagation, MarketplacePropagator, PropagationReport};
