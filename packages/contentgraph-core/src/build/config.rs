//! Build configuration.
//!
//! One configuration object flows from the driver into the stages that need
//! it; there is no process-wide mutable state.

use crate::graph::{DependencyConfig, RetryPolicy};
use crate::shared::models::Marketplace;

/// What to do when artifacts inside a pack fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsePolicy {
    /// Any artifact error fails its pack, and any failed pack aborts the
    /// build: packs may depend on each other's node identities.
    #[default]
    Strict,
    /// Failed packs and artifacts are reported and skipped; the rest of the
    /// build proceeds.
    Lenient,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub parse_policy: ParsePolicy,
    /// Marketplaces to propagate. Defaults to all known ones.
    pub marketplaces: Vec<Marketplace>,
    /// Parser worker cap. Defaults to the core count.
    pub workers: usize,
    pub retry: RetryPolicy,
    pub dependency: DependencyConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parse_policy: ParsePolicy::default(),
            marketplaces: Marketplace::ALL.to_vec(),
            workers: num_cpus::get(),
            retry: RetryPolicy::default(),
            dependency: DependencyConfig::default(),
        }
    }
}

impl BuildConfig {
    pub fn lenient() -> Self {
        Self {
            parse_policy: ParsePolicy::Lenient,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_marketplaces(mut self, marketplaces: impl IntoIterator<Item = Marketplace>) -> Self {
        self.marketplaces = marketplaces.into_iter().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.parse_policy, ParsePolicy::Strict);
        assert_eq!(config.marketplaces.len(), 3);
        assert!(config.workers >= 1);
    }

    #[test]
    fn test_workers_floor() {
        let config = BuildConfig::default().with_workers(0);
        assert_eq!(config.workers, 1);
    }
}
