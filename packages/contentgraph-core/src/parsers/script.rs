//! Script artifact parser.
//!
//! Scripts declare their dependencies under `dependson`: `must` entries are
//! mandatory, `should` entries are not. Targets are bare command or script
//! names, resolved against `Command`/`Script` nodes at commit time.

use std::path::Path;

use serde_json::json;

use super::{
    marketplaces_from, normalize_command, read_yaml, yaml_bool, yaml_str, yaml_string_seq,
    yaml_versions, ItemParser,
};
use crate::shared::models::{
    ContentNode, ContentType, GraphError, MarketplaceSet, Relationship, RelationshipKind, Result,
};

pub struct ScriptParser {
    node: ContentNode,
    relationships: Vec<Relationship>,
}

impl ScriptParser {
    pub fn from_path(path: &Path, pack_marketplaces: &MarketplaceSet) -> Result<Self> {
        let doc = read_yaml(path)?;
        let id = doc
            .get("commonfields")
            .and_then(|c| yaml_str(c, "id"))
            .ok_or_else(|| {
                GraphError::parse("script is missing commonfields.id")
                    .with_file(path.display().to_string())
            })?;
        let name = yaml_str(&doc, "name").unwrap_or_else(|| id.clone());
        let marketplaces = marketplaces_from(&yaml_string_seq(&doc, "marketplaces"), pack_marketplaces);
        let (fromversion, toversion) = yaml_versions(&doc);

        let mut node = ContentNode::new(ContentType::Script, id, name)
            .with_marketplaces(marketplaces.clone())
            .with_versions(fromversion, toversion)
            .with_deprecated(yaml_bool(&doc, "deprecated"))
            .with_file_path(path.display().to_string());
        let tags = yaml_string_seq(&doc, "tags");
        if !tags.is_empty() {
            node = node.with_attr("tags", json!(tags));
        }
        if let Some(comment) = yaml_str(&doc, "comment") {
            node = node.with_attr("description", json!(comment));
        }

        let mut relationships = Vec::new();
        if let Some(dependson) = doc.get("dependson") {
            for (key, mandatorily) in [("must", true), ("should", false)] {
                for target in yaml_string_seq(dependson, key) {
                    let command = normalize_command(&target);
                    if command.is_empty() {
                        continue;
                    }
                    relationships.push(
                        Relationship::new(
                            RelationshipKind::UsesCommandOrScript,
                            node.node_id.clone(),
                            marketplaces.clone(),
                            command,
                        )
                        .mandatorily(mandatorily),
                    );
                }
            }
        }

        Ok(Self {
            node,
            relationships,
        })
    }
}

impl ItemParser for ScriptParser {
    fn content_type(&self) -> ContentType {
        ContentType::Script
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_dependson_must_and_should() {
        let file = write_yml(
            r#"
commonfields:
  id: IsIPInRanges
name: IsIPInRanges
tags:
  - ip
dependson:
  must:
    - Active Directory|||ad-get-user
    - OtherScript
  should:
    - optional-command
"#,
        );
        let parser = ScriptParser::from_path(file.path(), &MarketplaceSet::all()).unwrap();

        assert_eq!(parser.node().node_id, "Script:IsIPInRanges");
        let rels = parser.relationships();
        assert_eq!(rels.len(), 3);
        assert!(rels
            .iter()
            .all(|r| r.kind == RelationshipKind::UsesCommandOrScript));

        // Brand prefix stripped, mandatory flag per list
        assert_eq!(rels[0].target, "ad-get-user");
        assert!(rels[0].mandatorily);
        assert_eq!(rels[1].target, "OtherScript");
        assert!(rels[1].mandatorily);
        assert_eq!(rels[2].target, "optional-command");
        assert!(!rels[2].mandatorily);
    }

    #[test]
    fn test_script_without_dependencies() {
        let file = write_yml("commonfields:\n  id: Standalone\nname: Standalone\n");
        let parser = ScriptParser::from_path(file.path(), &MarketplaceSet::all()).unwrap();
        assert!(parser.relationships().is_empty());
    }
}
