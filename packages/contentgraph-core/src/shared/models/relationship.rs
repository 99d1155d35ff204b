//! Relationship models.
//!
//! Parsers emit [`Relationship`] records; the store keeps
//! [`StoredRelationship`] edges, unique per
//! `(source_node_id, kind, target_node_id)`. Re-committing an existing edge
//! merges instead of duplicating: boolean properties fold by OR, marketplace
//! sets by union.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::marketplace::MarketplaceSet;

/// Kind of a relationship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    #[serde(rename = "IN_PACK")]
    InPack,
    #[serde(rename = "HAS_COMMAND")]
    HasCommand,
    #[serde(rename = "USES")]
    Uses,
    #[serde(rename = "USES_COMMAND_OR_SCRIPT")]
    UsesCommandOrScript,
    #[serde(rename = "DEPENDS_ON")]
    DependsOn,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 5] = [
        RelationshipKind::InPack,
        RelationshipKind::HasCommand,
        RelationshipKind::Uses,
        RelationshipKind::UsesCommandOrScript,
        RelationshipKind::DependsOn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::InPack => "IN_PACK",
            RelationshipKind::HasCommand => "HAS_COMMAND",
            RelationshipKind::Uses => "USES",
            RelationshipKind::UsesCommandOrScript => "USES_COMMAND_OR_SCRIPT",
            RelationshipKind::DependsOn => "DEPENDS_ON",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PACK" => Some(RelationshipKind::InPack),
            "HAS_COMMAND" => Some(RelationshipKind::HasCommand),
            "USES" => Some(RelationshipKind::Uses),
            "USES_COMMAND_OR_SCRIPT" => Some(RelationshipKind::UsesCommandOrScript),
            "DEPENDS_ON" => Some(RelationshipKind::DependsOn),
            _ => None,
        }
    }

    /// Commit ordering rank for the graph loader.
    ///
    /// `HAS_COMMAND` creates `Command` nodes as a side effect, so it must
    /// commit before `USES_COMMAND_OR_SCRIPT`, which resolves bare command
    /// names against those nodes. Everything else only needs the node batches
    /// to be committed first.
    pub fn commit_rank(&self) -> u8 {
        match self {
            RelationshipKind::HasCommand => 0,
            RelationshipKind::InPack | RelationshipKind::Uses | RelationshipKind::DependsOn => 1,
            RelationshipKind::UsesCommandOrScript => 2,
        }
    }

    /// Whether `target` of a parsed record is a bare artifact id rather than
    /// a full node id.
    pub fn targets_bare_id(&self) -> bool {
        matches!(
            self,
            RelationshipKind::HasCommand | RelationshipKind::UsesCommandOrScript
        )
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A relationship record as produced by the parsers, before commit.
///
/// `target` holds a node id for `IN_PACK` / `USES` / `DEPENDS_ON` and a bare
/// artifact id for `HAS_COMMAND` / `USES_COMMAND_OR_SCRIPT` (resolved at
/// commit time). `source_marketplaces` snapshots the source node's set at
/// parse time; commit uses it to seed `Command` nodes and to gate dependency
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub source_node_id: String,
    pub source_marketplaces: MarketplaceSet,
    pub target: String,
    #[serde(default)]
    pub mandatorily: bool,
    #[serde(default)]
    pub deprecated: bool,
}

impl Relationship {
    pub fn new(
        kind: RelationshipKind,
        source_node_id: impl Into<String>,
        source_marketplaces: MarketplaceSet,
        target: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source_node_id: source_node_id.into(),
            source_marketplaces,
            target: target.into(),
            mandatorily: false,
            deprecated: false,
        }
    }

    pub fn mandatorily(mut self, mandatorily: bool) -> Self {
        self.mandatorily = mandatorily;
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }
}

/// A committed edge of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRelationship {
    pub kind: RelationshipKind,
    pub source_node_id: String,
    pub target_node_id: String,
    pub mandatorily: bool,
    pub deprecated: bool,
    /// Only meaningful on `DEPENDS_ON` edges (intersection of the two pack
    /// sets); empty elsewhere.
    pub marketplaces: MarketplaceSet,
}

impl StoredRelationship {
    pub fn new(
        kind: RelationshipKind,
        source_node_id: impl Into<String>,
        target_node_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source_node_id: source_node_id.into(),
            target_node_id: target_node_id.into(),
            mandatorily: false,
            deprecated: false,
            marketplaces: MarketplaceSet::new(),
        }
    }

    /// Unique key of this edge.
    pub fn key(&self) -> (String, RelationshipKind, String) {
        (
            self.source_node_id.clone(),
            self.kind,
            self.target_node_id.clone(),
        )
    }

    /// Fold another occurrence of the same edge into this one.
    ///
    /// `mandatorily` and `deprecated` are never downgraded from `true`;
    /// marketplace sets are replaced when `marketplaces` is given (the
    /// aggregator recomputes the intersection on every merge).
    pub fn fold(
        &mut self,
        mandatorily: bool,
        deprecated: bool,
        marketplaces: Option<&MarketplaceSet>,
    ) {
        self.mandatorily = self.mandatorily || mandatorily;
        self.deprecated = self.deprecated || deprecated;
        if let Some(mps) = marketplaces {
            self.marketplaces = mps.clone();
        }
    }
}
