//! Persistent backends for the content graph store port.
//!
//! The in-memory reference backend lives in `contentgraph-core`; this crate
//! adds durable storage. The SQLite adapter (behind the default `sqlite`
//! feature) keeps nodes and relationships in two tables and implements the
//! same merge/fold/pass semantics inside transactions.
//!
//! ```rust,ignore
//! use contentgraph_core::ContentGraphBuilder;
//! use contentgraph_storage::SqliteGraphStore;
//!
//! let store = SqliteGraphStore::open("content_graph.db")?;
//! let builder = ContentGraphBuilder::new(store);
//! let report = builder.build(content_root).await?;
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteGraphStore;
