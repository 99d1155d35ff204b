//! Content node model.
//!
//! A node represents one artifact (integration, script, playbook, ...) or one
//! pack. Identity is the `node_id` string `<ContentType>:<id>`; it is computed
//! once at parse time and is the sole key used for merge operations, so two
//! parses of the same artifact always land on the same node.

use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::marketplace::MarketplaceSet;

/// Lower bound applied when an artifact declares no `fromversion`.
pub const DEFAULT_FROMVERSION: &str = "0.0.0";
/// Upper bound applied when an artifact declares no `toversion`.
pub const DEFAULT_TOVERSION: &str = "99.99.99";

/// Kind of a content node.
///
/// `Command` nodes are never parsed from files; they are merge-created while
/// committing `HAS_COMMAND` relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Pack,
    Integration,
    Script,
    Playbook,
    Job,
    Classifier,
    Command,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::Pack,
        ContentType::Integration,
        ContentType::Script,
        ContentType::Playbook,
        ContentType::Job,
        ContentType::Classifier,
        ContentType::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Pack => "Pack",
            ContentType::Integration => "Integration",
            ContentType::Script => "Script",
            ContentType::Playbook => "Playbook",
            ContentType::Job => "Job",
            ContentType::Classifier => "Classifier",
            ContentType::Command => "Command",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pack" => Some(ContentType::Pack),
            "Integration" => Some(ContentType::Integration),
            "Script" => Some(ContentType::Script),
            "Playbook" => Some(ContentType::Playbook),
            "Job" => Some(ContentType::Job),
            "Classifier" => Some(ContentType::Classifier),
            "Command" => Some(ContentType::Command),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the globally unique node id for a `(content_type, id)` pair.
pub fn node_id_of(content_type: ContentType, id: &str) -> String {
    format!("{}:{}", content_type.as_str(), id)
}

/// Split a node id back into its content type and artifact-local id.
pub fn split_node_id(node_id: &str) -> Option<(ContentType, &str)> {
    let (kind, id) = node_id.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    Some((ContentType::parse(kind)?, id))
}

/// One node of the content graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    /// Globally unique identity, `<ContentType>:<id>`. Immutable.
    pub node_id: String,
    /// Artifact-local identifier, unique only within its content type.
    pub id: String,
    pub content_type: ContentType,
    pub name: String,
    #[serde(default)]
    pub deprecated: bool,
    /// Marketplaces this node is distributable to. Never empty for a live
    /// node; only the propagation engine shrinks it.
    pub marketplaces: MarketplaceSet,
    pub fromversion: String,
    pub toversion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Kind-specific extra properties (display, tags, support tier, ...).
    #[serde(default)]
    pub attrs: AHashMap<String, serde_json::Value>,
}

impl ContentNode {
    pub fn new(content_type: ContentType, id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            node_id: node_id_of(content_type, &id),
            id,
            content_type,
            name: name.into(),
            deprecated: false,
            marketplaces: MarketplaceSet::new(),
            fromversion: DEFAULT_FROMVERSION.to_string(),
            toversion: DEFAULT_TOVERSION.to_string(),
            file_path: None,
            attrs: AHashMap::new(),
        }
    }

    pub fn with_marketplaces(mut self, marketplaces: MarketplaceSet) -> Self {
        self.marketplaces = marketplaces;
        self
    }

    pub fn with_versions(
        mut self,
        fromversion: impl Into<String>,
        toversion: impl Into<String>,
    ) -> Self {
        self.fromversion = fromversion.into();
        self.toversion = toversion.into();
        self
    }

    pub fn with_deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Whether this node is currently tagged with the given marketplace.
    #[inline]
    pub fn is_in(&self, marketplace: super::marketplace::Marketplace) -> bool {
        self.marketplaces.contains(marketplace)
    }
}
