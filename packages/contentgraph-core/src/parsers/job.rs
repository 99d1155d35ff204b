//! Job artifact parser.
//!
//! A job schedules one playbook; that reference is always mandatory.

use std::path::Path;

use serde_json::json;

use super::{json_bool, json_str, json_versions, marketplaces_from, read_json, ItemParser};
use crate::shared::models::{
    node_id_of, ContentNode, ContentType, GraphError, MarketplaceSet, Relationship,
    RelationshipKind, Result,
};

pub struct JobParser {
    node: ContentNode,
    relationships: Vec<Relationship>,
}

impl JobParser {
    pub fn from_path(path: &Path, pack_marketplaces: &MarketplaceSet) -> Result<Self> {
        let doc = read_json(path)?;
        let id = json_str(&doc, "id").ok_or_else(|| {
            GraphError::parse("job is missing id").with_file(path.display().to_string())
        })?;
        let name = json_str(&doc, "name").unwrap_or_else(|| id.clone());
        let declared: Vec<String> = doc
            .get("marketplaces")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let marketplaces = marketplaces_from(&declared, pack_marketplaces);
        let (fromversion, toversion) = json_versions(&doc);

        let mut node = ContentNode::new(ContentType::Job, id, name)
            .with_marketplaces(marketplaces.clone())
            .with_versions(fromversion, toversion)
            .with_deprecated(json_bool(&doc, "deprecated"))
            .with_file_path(path.display().to_string());
        if let Some(details) = json_str(&doc, "details") {
            node = node.with_attr("description", json!(details));
        }
        if json_bool(&doc, "isFeed") {
            node = node.with_attr("is_feed", json!(true));
        }

        let mut relationships = Vec::new();
        if let Some(playbook) = json_str(&doc, "playbookId").filter(|s| !s.is_empty()) {
            relationships.push(
                Relationship::new(
                    RelationshipKind::Uses,
                    node.node_id.clone(),
                    marketplaces.clone(),
                    node_id_of(ContentType::Playbook, &playbook),
                )
                .mandatorily(true),
            );
        }

        Ok(Self {
            node,
            relationships,
        })
    }
}

impl ItemParser for JobParser {
    fn content_type(&self) -> ContentType {
        ContentType::Job
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
