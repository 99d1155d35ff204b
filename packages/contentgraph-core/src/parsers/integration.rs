//! Integration artifact parser.
//!
//! An integration declares commands; each one becomes a `HAS_COMMAND`
//! relationship whose commit merge-creates the `Command` node. Default
//! classifier/mapper references become non-mandatory `USES` edges.

use std::path::Path;

use serde_json::json;
use tracing::warn;

use super::{
    marketplaces_from, read_yaml, yaml_bool, yaml_str, yaml_string_seq, yaml_versions, ItemParser,
};
use crate::shared::models::{
    node_id_of, ContentNode, ContentType, GraphError, MarketplaceSet, Relationship,
    RelationshipKind, Result,
};

#[derive(Debug)]
pub struct IntegrationParser {
    node: ContentNode,
    relationships: Vec<Relationship>,
}

impl IntegrationParser {
    pub fn from_path(path: &Path, pack_marketplaces: &MarketplaceSet) -> Result<Self> {
        let doc = read_yaml(path)?;
        let id = doc
            .get("commonfields")
            .and_then(|c| yaml_str(c, "id"))
            .ok_or_else(|| {
                GraphError::parse("integration is missing commonfields.id")
                    .with_file(path.display().to_string())
            })?;
        let name = yaml_str(&doc, "name").unwrap_or_else(|| id.clone());
        let marketplaces = marketplaces_from(&yaml_string_seq(&doc, "marketplaces"), pack_marketplaces);
        let (fromversion, toversion) = yaml_versions(&doc);

        let mut node = ContentNode::new(ContentType::Integration, id, name)
            .with_marketplaces(marketplaces.clone())
            .with_versions(fromversion, toversion)
            .with_deprecated(yaml_bool(&doc, "deprecated"))
            .with_file_path(path.display().to_string());
        if let Some(display) = yaml_str(&doc, "display") {
            node = node.with_attr("display", json!(display));
        }
        if let Some(category) = yaml_str(&doc, "category") {
            node = node.with_attr("category", json!(category));
        }
        if yaml_bool(&doc, "isfetch") {
            node = node.with_attr("is_fetch", json!(true));
        }

        let mut relationships = Vec::new();
        if let Some(commands) = doc
            .get("script")
            .and_then(|s| s.get("commands"))
            .and_then(serde_yaml::Value::as_sequence)
        {
            for command in commands {
                let Some(command_name) = yaml_str(command, "name") else {
                    warn!(integration = %node.node_id, "skipping unnamed command");
                    continue;
                };
                relationships.push(
                    Relationship::new(
                        RelationshipKind::HasCommand,
                        node.node_id.clone(),
                        marketplaces.clone(),
                        command_name,
                    )
                    .deprecated(yaml_bool(command, "deprecated")),
                );
            }
        }
        for key in ["defaultclassifier", "defaultmapperin", "defaultmapperout"] {
            if let Some(classifier) = yaml_str(&doc, key).filter(|s| !s.is_empty()) {
                relationships.push(Relationship::new(
                    RelationshipKind::Uses,
                    node.node_id.clone(),
                    marketplaces.clone(),
                    node_id_of(ContentType::Classifier, &classifier),
                ));
            }
        }

        Ok(Self {
            node,
            relationships,
        })
    }
}

impl ItemParser for IntegrationParser {
    fn content_type(&self) -> ContentType {
        ContentType::Integration
    }

    fn node(&self) -> &ContentNode {
        &self.node
    }

    fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    fn into_parts(self: Box<Self>) -> (ContentNode, Vec<Relationship>) {
        (self.node, self.relationships)
    }
}
