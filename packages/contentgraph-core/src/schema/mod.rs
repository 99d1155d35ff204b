//! Schema registry.
//!
//! Static table of the constraints every backend declares at
//! `ensure_schema()` time and enforces at commit time: per node kind the
//! indexed properties, the composite node key, the unique properties and the
//! required properties; per relationship kind the required edge properties.
//!
//! Validation here is batch-atomic: if any record in a batch violates a
//! constraint the whole batch is rejected before a single record is applied.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::shared::models::{
    ContentNode, ContentType, GraphError, Relationship, RelationshipKind, Result,
};

/// Constraint set for one node kind.
#[derive(Debug, Clone, Copy)]
pub struct NodeSchema {
    pub content_type: ContentType,
    /// Properties to index for lookup.
    pub indexed: &'static [&'static str],
    /// Composite key identifying a node of this kind.
    pub node_key: &'static [&'static str],
    /// Properties that must be unique across nodes of this kind.
    pub unique: &'static [&'static str],
    /// Properties that must be present and non-empty.
    pub required: &'static [&'static str],
}

/// Constraint set for one relationship kind.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipSchema {
    pub kind: RelationshipKind,
    pub required: &'static [&'static str],
}

const ITEM_REQUIRED: &[&str] = &["node_id", "id", "name", "marketplaces"];

static NODE_SCHEMAS: &[NodeSchema] = &[
    NodeSchema {
        content_type: ContentType::Pack,
        indexed: &["id", "name"],
        node_key: &["node_id"],
        unique: &["node_id"],
        required: ITEM_REQUIRED,
    },
    NodeSchema {
        content_type: ContentType::Integration,
        indexed: &["id", "name"],
        node_key: &["node_id"],
        unique: &["node_id"],
        required: ITEM_REQUIRED,
    },
    NodeSchema {
        content_type: ContentType::Script,
        indexed: &["id", "name"],
        node_key: &["node_id"],
        unique: &["node_id"],
        required: ITEM_REQUIRED,
    },
    NodeSchema {
        content_type: ContentType::Playbook,
        indexed: &["id", "name"],
        node_key: &["node_id"],
        unique: &["node_id"],
        required: ITEM_REQUIRED,
    },
    NodeSchema {
        content_type: ContentType::Job,
        indexed: &["id", "name"],
        node_key: &["node_id"],
        unique: &["node_id"],
        required: ITEM_REQUIRED,
    },
    NodeSchema {
        content_type: ContentType::Classifier,
        indexed: &["id", "name"],
        node_key: &["node_id"],
        unique: &["node_id"],
        required: ITEM_REQUIRED,
    },
    // Command nodes are merge-created from HAS_COMMAND edges; their name
    // defaults to the command id and marketplaces are seeded at commit time.
    NodeSchema {
        content_type: ContentType::Command,
        indexed: &["id"],
        node_key: &["node_id"],
        unique: &["node_id"],
        required: &["node_id", "id"],
    },
];

static RELATIONSHIP_SCHEMAS: &[RelationshipSchema] = &[
    RelationshipSchema {
        kind: RelationshipKind::InPack,
        required: &["source_node_id", "target"],
    },
    RelationshipSchema {
        kind: RelationshipKind::HasCommand,
        required: &["source_node_id", "target", "deprecated"],
    },
    RelationshipSchema {
        kind: RelationshipKind::Uses,
        required: &["source_node_id", "target", "mandatorily"],
    },
    RelationshipSchema {
        kind: RelationshipKind::UsesCommandOrScript,
        required: &["source_node_id", "target", "mandatorily"],
    },
    RelationshipSchema {
        kind: RelationshipKind::DependsOn,
        required: &["source_node_id", "target", "mandatorily", "marketplaces"],
    },
];

static NODE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+:.+$").unwrap());

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

/// The static constraint table.
pub struct SchemaRegistry {
    nodes: &'static [NodeSchema],
    relationships: &'static [RelationshipSchema],
}

static REGISTRY: Lazy<SchemaRegistry> = Lazy::new(|| SchemaRegistry {
    nodes: NODE_SCHEMAS,
    relationships: RELATIONSHIP_SCHEMAS,
});

impl SchemaRegistry {
    pub fn global() -> &'static SchemaRegistry {
        &REGISTRY
    }

    pub fn node_schemas(&self) -> &'static [NodeSchema] {
        self.nodes
    }

    pub fn relationship_schemas(&self) -> &'static [RelationshipSchema] {
        self.relationships
    }

    pub fn node_schema(&self, content_type: ContentType) -> Option<&'static NodeSchema> {
        self.nodes.iter().find(|s| s.content_type == content_type)
    }

    pub fn relationship_schema(&self, kind: RelationshipKind) -> Option<&'static RelationshipSchema> {
        self.relationships.iter().find(|s| s.kind == kind)
    }

    /// Validate one node batch against the constraints for its kind.
    ///
    /// Checks node id shape and kind consistency, required properties,
    /// version bounds, and in-batch uniqueness.
    pub fn validate_nodes(&self, content_type: ContentType, nodes: &[ContentNode]) -> Result<()> {
        let schema = self.node_schema(content_type).ok_or_else(|| {
            GraphError::schema(format!("no schema registered for {content_type}"))
        })?;

        let mut seen = ahash::AHashSet::with_capacity(nodes.len());
        for node in nodes {
            if node.content_type != content_type {
                return Err(GraphError::schema(format!(
                    "node {} has kind {} but was committed in a {} batch",
                    node.node_id, node.content_type, content_type
                )));
            }
            if !NODE_ID_RE.is_match(&node.node_id)
                || node.node_id != crate::shared::models::node_id_of(content_type, &node.id)
            {
                return Err(GraphError::schema(format!(
                    "malformed node_id {:?} for {} {:?}",
                    node.node_id, content_type, node.id
                )));
            }
            for prop in schema.required {
                let present = match *prop {
                    "node_id" => !node.node_id.is_empty(),
                    "id" => !node.id.is_empty(),
                    "name" => !node.name.is_empty(),
                    "marketplaces" => !node.marketplaces.is_empty(),
                    other => node.attrs.contains_key(other),
                };
                if !present {
                    return Err(GraphError::schema(format!(
                        "node {} is missing required property {:?}",
                        node.node_id, prop
                    )));
                }
            }
            if !VERSION_RE.is_match(&node.fromversion) || !VERSION_RE.is_match(&node.toversion) {
                return Err(GraphError::schema(format!(
                    "node {} has malformed version bounds {:?}..{:?}",
                    node.node_id, node.fromversion, node.toversion
                )));
            }
            if !seen.insert(node.node_id.as_str()) {
                return Err(GraphError::schema(format!(
                    "duplicate node_id {} within batch",
                    node.node_id
                )));
            }
        }
        Ok(())
    }

    /// Validate one relationship batch for its declared kind.
    pub fn validate_relationships(
        &self,
        kind: RelationshipKind,
        relationships: &[Relationship],
    ) -> Result<()> {
        if self.relationship_schema(kind).is_none() {
            return Err(GraphError::schema(format!("no schema registered for {kind}")));
        }
        for rel in relationships {
            if rel.kind != kind {
                return Err(GraphError::schema(format!(
                    "relationship {} -> {} has kind {} but was committed in a {} batch",
                    rel.source_node_id, rel.target, rel.kind, kind
                )));
            }
            if rel.source_node_id.is_empty() || !NODE_ID_RE.is_match(&rel.source_node_id) {
                return Err(GraphError::schema(format!(
                    "{} relationship has malformed source_node_id {:?}",
                    kind, rel.source_node_id
                )));
            }
            if rel.target.is_empty() {
                return Err(GraphError::schema(format!(
                    "{} relationship from {} has an empty target",
                    kind, rel.source_node_id
                )));
            }
            if !kind.targets_bare_id() && !NODE_ID_RE.is_match(&rel.target) {
                return Err(GraphError::schema(format!(
                    "{} relationship from {} targets {:?}, expected a node id",
                    kind, rel.source_node_id, rel.target
                )));
            }
        }
        Ok(())
    }
}
