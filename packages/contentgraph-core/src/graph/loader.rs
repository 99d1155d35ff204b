//! Graph loader.
//!
//! Commits the batches produced by pack parsing in the order the merge
//! semantics require: all node batches first, then relationship batches with
//! `HAS_COMMAND` ahead of `USES_COMMAND_OR_SCRIPT` (command nodes must exist
//! before bare command names resolve against them). The two stages form a
//! barrier; batches are never committed concurrently.

use std::future::Future;
use std::time::Duration;

use ahash::AHashMap;
use tracing::{debug, warn};

use super::ports::ContentGraphStore;
use crate::shared::models::{
    ContentNode, ContentType, ErrorCategory, Relationship, RelationshipKind, Result,
};

/// Bounded retry with exponential backoff for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry attempt (1-based): base * 2^(attempt-1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitSummary {
    pub nodes_committed: usize,
    pub relationships_committed: usize,
}

pub struct GraphLoader<'a, S: ContentGraphStore> {
    store: &'a S,
    retry: RetryPolicy,
}

impl<'a, S: ContentGraphStore> GraphLoader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(store: &'a S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Commit a build's batches in the required order.
    pub async fn commit(
        &self,
        nodes: AHashMap<ContentType, Vec<ContentNode>>,
        relationships: AHashMap<RelationshipKind, Vec<Relationship>>,
    ) -> Result<CommitSummary> {
        let mut summary = CommitSummary::default();

        let mut node_batches: Vec<(ContentType, Vec<ContentNode>)> = nodes.into_iter().collect();
        node_batches.sort_by_key(|(content_type, _)| content_type.as_str());
        for (content_type, batch) in node_batches {
            if batch.is_empty() {
                continue;
            }
            debug!(kind = %content_type, records = batch.len(), "committing node batch");
            summary.nodes_committed += self
                .retrying(content_type.as_str(), || {
                    self.store.upsert_nodes(content_type, batch.clone())
                })
                .await?;
        }

        let mut relationship_batches: Vec<(RelationshipKind, Vec<Relationship>)> =
            relationships.into_iter().collect();
        relationship_batches.sort_by_key(|(kind, _)| (kind.commit_rank(), kind.as_str()));
        for (kind, batch) in relationship_batches {
            if batch.is_empty() {
                continue;
            }
            debug!(kind = %kind, records = batch.len(), "committing relationship batch");
            summary.relationships_committed += self
                .retrying(kind.as_str(), || {
                    self.store.upsert_relationships(kind, batch.clone())
                })
                .await?;
        }

        Ok(summary)
    }

    async fn retrying<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e)
                    if e.category() == ErrorCategory::Transient
                        && attempt < self.retry.max_attempts =>
                {
                    warn!(batch = what, attempt, error = %e, "transient store failure, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
