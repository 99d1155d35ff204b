//! Build driver.
//!
//! Orchestrates a full build: discover packs, parse them in parallel, commit
//! through the graph loader, propagate marketplaces to fixpoint, aggregate
//! pack dependencies, and assemble the report. Pack parsing shares no mutable
//! state; the only synchronization point is the per-kind batch accumulator.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::config::{BuildConfig, ParsePolicy};
use crate::graph::{
    ContentGraphStore, GraphLoader, MarketplacePropagator, PackDependencyGraph, PropagationReport,
};
use crate::parsers::{PackGraph, PackParser};
use crate::shared::models::{
    ContentNode, ContentType, GraphError, PackError, Relationship, RelationshipKind, Result,
};

/// Outcome of one build.
#[derive(Debug)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub packs_discovered: usize,
    pub packs_parsed: usize,
    /// Packs dropped entirely (metadata failure, or any artifact error under
    /// the strict policy before it aborts the build).
    pub packs_failed: Vec<PackError>,
    /// Packs loaded without their broken artifacts (lenient policy only).
    pub packs_degraded: Vec<PackError>,
    pub nodes_committed: usize,
    pub relationships_committed: usize,
    pub propagation: PropagationReport,
    pub dependencies_created: usize,
    pub dependency_cycles: Vec<Vec<String>>,
    pub cancelled: bool,
}

pub struct ContentGraphBuilder<S: ContentGraphStore> {
    store: S,
    config: BuildConfig,
    cancelled: Arc<AtomicBool>,
}

impl<S: ContentGraphStore> ContentGraphBuilder<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, BuildConfig::default())
    }

    pub fn with_config(store: S, config: BuildConfig) -> Self {
        Self {
            store,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked cooperatively before each pack parse. Setting it stops
    /// new packs from being parsed; already committed stages stay committed
    /// (idempotent upserts make a from-scratch re-run safe).
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Run a full build over a content root whose direct children are pack
    /// directories.
    pub async fn build(&self, content_root: &Path) -> Result<BuildReport> {
        let build_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%build_id, root = %content_root.display(), "starting content graph build");

        self.store.ensure_schema().await?;

        let packs = discover_packs(content_root)?;
        info!(packs = packs.len(), "discovered packs");

        let (nodes, relationships, parsed, failed, degraded) = self.parse_packs(&packs)?;

        let loader = GraphLoader::with_retry(&self.store, self.config.retry.clone());
        let summary = loader.commit(nodes, relationships).await?;
        info!(
            nodes = summary.nodes_committed,
            relationships = summary.relationships_committed,
            "graph committed"
        );

        let propagator = MarketplacePropagator::new(&self.store);
        let propagation = propagator.propagate_all(&self.config.marketplaces).await?;

        let dependencies_created = self
            .store
            .run_dependency_aggregation(&self.config.dependency)
            .await?;

        let depends_on = self
            .store
            .relationships_of_kind(RelationshipKind::DependsOn)
            .await?;
        let pack_graph = PackDependencyGraph::from_relationships(&depends_on);
        let dependency_cycles = pack_graph.cycles();
        for cycle in &dependency_cycles {
            warn!(packs = ?cycle, "pack dependency cycle");
        }

        let report = BuildReport {
            build_id,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            packs_discovered: packs.len(),
            packs_parsed: parsed,
            packs_failed: failed,
            packs_degraded: degraded,
            nodes_committed: summary.nodes_committed,
            relationships_committed: summary.relationships_committed,
            propagation,
            dependencies_created,
            dependency_cycles,
            cancelled: self.cancelled.load(Ordering::Relaxed),
        };
        info!(
            %build_id,
            duration_ms = report.duration_ms,
            removed = report.propagation.total_removed(),
            dependencies = report.dependencies_created,
            "build finished"
        );
        Ok(report)
    }

    /// Parse all packs on a bounded rayon pool, appending completed batches
    /// to concurrent per-kind accumulators.
    #[allow(clippy::type_complexity)]
    fn parse_packs(
        &self,
        packs: &[PathBuf],
    ) -> Result<(
        AHashMap<ContentType, Vec<ContentNode>>,
        AHashMap<RelationshipKind, Vec<Relationship>>,
        usize,
        Vec<PackError>,
        Vec<PackError>,
    )> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| GraphError::internal(format!("failed to build parser pool: {e}")))?;

        let strict = self.config.parse_policy == ParsePolicy::Strict;
        let nodes_acc: DashMap<ContentType, Vec<ContentNode>> = DashMap::new();
        let relationships_acc: DashMap<RelationshipKind, Vec<Relationship>> = DashMap::new();
        let failed: Mutex<Vec<PackError>> = Mutex::new(Vec::new());
        let degraded: Mutex<Vec<PackError>> = Mutex::new(Vec::new());
        let parsed = AtomicUsize::new(0);
        let cancelled = &self.cancelled;

        pool.install(|| {
            packs.par_iter().for_each(|pack_path| {
                if cancelled.load(Ordering::Relaxed) {
                    return;
                }
                match PackParser::parse(pack_path) {
                    Ok(graph) => {
                        let PackGraph {
                            pack_id,
                            nodes,
                            relationships,
                            errors,
                            ..
                        } = graph;
                        if !errors.is_empty() {
                            if strict {
                                // The whole pack is rejected; its batches
                                // never reach the accumulator
                                failed.lock().push(PackError::new(pack_id, errors));
                                return;
                            }
                            degraded.lock().push(PackError::new(pack_id, errors));
                        }
                        for (content_type, batch) in nodes {
                            nodes_acc.entry(content_type).or_default().extend(batch);
                        }
                        for (kind, batch) in relationships {
                            relationships_acc.entry(kind).or_default().extend(batch);
                        }
                        parsed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        let pack_id = pack_path
                            .file_name()
                            .and_then(|s| s.to_str())
                            .unwrap_or("<unnamed>")
                            .to_string();
                        failed.lock().push(PackError::single(pack_id, e));
                    }
                }
            });
        });

        let mut failed = failed.into_inner();
        let degraded = degraded.into_inner();
        for pack_error in failed.iter().chain(degraded.iter()) {
            for cause in &pack_error.errors {
                error!(pack = %pack_error.pack_id, %cause, "pack error");
            }
        }
        if strict && !failed.is_empty() {
            return Err(failed.swap_remove(0).into_graph_error());
        }

        Ok((
            nodes_acc.into_iter().collect(),
            relationships_acc.into_iter().collect(),
            parsed.load(Ordering::Relaxed),
            failed,
            degraded,
        ))
    }
}

/// Pack directories are the direct children of the content root.
fn discover_packs(content_root: &Path) -> Result<Vec<PathBuf>> {
    if !content_root.is_dir() {
        return Err(GraphError::config(format!(
            "content root {} is not a directory",
            content_root.display()
        )));
    }
    let mut packs = Vec::new();
    for entry in WalkDir::new(content_root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            GraphError::new(
                crate::shared::models::ErrorKind::Io,
                format!("failed to walk content root: {e}"),
            )
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let hidden = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(true);
        if hidden {
            continue;
        }
        packs.push(entry.into_path());
    }
    packs.sort();
    Ok(packs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_packs_skips_files_and_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("PackA")).unwrap();
        std::fs::create_dir(dir.path().join("PackB")).unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("index.json"), "{}").unwrap();

        let packs = discover_packs(dir.path()).unwrap();
        let names: Vec<_> = packs
            .iter()
            .filter_map(|p| p.file_name().and_then(|s| s.to_str()))
            .collect();
        assert_eq!(names, vec!["PackA", "PackB"]);
    }

    #[test]
    fn test_missing_root_is_a_config_error() {
        let err = discover_packs(Path::new("/definitely/not/here")).unwrap_err();
        assert_eq!(err.kind, crate::shared::models::ErrorKind::Config);
    }
}
