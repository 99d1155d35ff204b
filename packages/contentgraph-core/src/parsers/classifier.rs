//! Classifier / mapper artifact parser. No outgoing references.

use std::path::Path;

use serde_json::json;

use super::{json_bool, json_str, json_versions, marketplaces_from, read_json, ItemParser};
use crate::shared::models::{
    ContentNode, ContentType, GraphError, MarketplaceSet, Relationship, Result,
};

pub struct ClassifierParser {
    node: ContentNode,
}

impl ClassifierParser {
    pub fn from_path(path: &Path, pack_marketplaces: &MarketplaceSet) -> Result<Self> {
        let doc = read_json(path)?;
        let id = json_str(&doc, "id").ok_or_else(|| {
            GraphError::parse("classifier is missing id").with_file(path.display().to_string())
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

        let mut node = ContentNode::new(ContentType::Classifier, id, name)
            .with_marketplaces(marketplaces)
            .with_versions(fromversion, toversion)
            .with_deprecated(json_bool(&doc, "deprecated"))
            .with_file_path(path.display().to_string());
        // "classification" or "mapping"; both live under the Classifier kind
        if let Some(kind) = json_str(&doc, "type") {
            node = node.with_attr("type", json!(kind));
        }
        if let Some(description) = json_str(&doc, "description") {
            node = node.with_attr("description", json!(description));
        }

        Ok(Self { node })
    }
}

impl ItemParser for ClassifierParser {
    fn content_type(&self) -> ContentType {
        ContentType::Classifier
    }

    fn node(&self) -> &ContentNode {
        &self.node
    }

    fn relationships(&self) -> &[Relationship] {
        &[]
    }

    fn into_parts(self: Box<Self>) -> (ContentNode, Vec<Relationship>) {
        (self.node, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_classifier() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"id": "MyClassifier", "name": "My Classifier", "type": "classification"}"#)
            .unwrap();

        let parser = ClassifierParser::from_path(file.path(), &MarketplaceSet::all()).unwrap();
        assert_eq!(parser.node().node_id, "Classifier:MyClassifier");
        assert!(parser.relationships().is_empty());
        assert_eq!(
            parser.node().attrs.get("type"),
            Some(&serde_json::json!("classification"))
        );
    }
}
