//! Playbook artifact parser.
//!
//! Each task may reference a sub-playbook, a script, or an integration
//! command (`<brand>|||<command>`). A task marked `skipunavailable`
//! contributes a non-mandatory edge, anything else is mandatory.

use std::path::Path;

use super::{
    marketplaces_from, normalize_command, read_yaml, yaml_bool, yaml_str, yaml_string_seq,
    yaml_versions, ItemParser,
};
use crate::shared::models::{
    node_id_of, ContentNode, ContentType, GraphError, MarketplaceSet, Relationship,
    RelationshipKind, Result,
};

pub struct PlaybookParser {
    node: ContentNode,
    relationships: Vec<Relationship>,
}

impl PlaybookParser {
    pub fn from_path(path: &Path, pack_marketplaces: &MarketplaceSet) -> Result<Self> {
        let doc = read_yaml(path)?;
        let id = yaml_str(&doc, "id").ok_or_else(|| {
            GraphError::parse("playbook is missing id").with_file(path.display().to_string())
        })?;
        let name = yaml_str(&doc, "name").unwrap_or_else(|| id.clone());
        let marketplaces = marketplaces_from(&yaml_string_seq(&doc, "marketplaces"), pack_marketplaces);
        let (fromversion, toversion) = yaml_versions(&doc);

        let node = ContentNode::new(ContentType::Playbook, id, name)
            .with_marketplaces(marketplaces.clone())
            .with_versions(fromversion, toversion)
            .with_deprecated(yaml_bool(&doc, "deprecated"))
            .with_file_path(path.display().to_string());

        let mut relationships = Vec::new();
        if let Some(tasks) = doc.get("tasks").and_then(serde_yaml::Value::as_mapping) {
            // Task keys are ordinals; sort them so parsing is deterministic.
            let mut entries: Vec<(&serde_yaml::Value, &serde_yaml::Value)> = tasks.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str().map(str::to_string));

            for (_, entry) in entries {
                let mandatorily = !yaml_bool(entry, "skipunavailable");
                let Some(task) = entry.get("task") else {
                    continue;
                };

                for key in ["playbookId", "playbookName"] {
                    if let Some(playbook) = yaml_str(task, key).filter(|s| !s.is_empty()) {
                        relationships.push(
                            Relationship::new(
                                RelationshipKind::Uses,
                                node.node_id.clone(),
                                marketplaces.clone(),
                                node_id_of(ContentType::Playbook, &playbook),
                            )
                            .mandatorily(mandatorily),
                        );
                        break;
                    }
                }

                if let Some(script_name) = yaml_str(task, "scriptName").filter(|s| !s.is_empty()) {
                    relationships.push(
                        Relationship::new(
                            RelationshipKind::UsesCommandOrScript,
                            node.node_id.clone(),
                            marketplaces.clone(),
                            script_name,
                        )
                        .mandatorily(mandatorily),
                    );
                }
                if let Some(script) = yaml_str(task, "script").filter(|s| !s.is_empty()) {
                    let command = normalize_command(&script);
                    if !command.is_empty() {
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
        }

        Ok(Self {
            node,
            relationships,
        })
    }
}

impl ItemParser for PlaybookParser {
    fn content_type(&self) -> ContentType {
        ContentType::Playbook
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
    fn test_task_references() {
        let file = write_yml(
            r#"
id: Phishing-Core
name: Phishing Core
tasks:
  "0":
    taskid: aaa
    task:
      playbookId: SubPlaybook
  "1":
    taskid: bbb
    skipunavailable: true
    task:
      scriptName: ParseEmail
  "2":
    taskid: ccc
    task:
      script: "Active Directory|||ad-get-user"
"#,
        );
        let parser = PlaybookParser::from_path(file.path(), &MarketplaceSet::all()).unwrap();

        assert_eq!(parser.node().node_id, "Playbook:Phishing-Core");
        let rels = parser.relationships();
        assert_eq!(rels.len(), 3);

        assert_eq!(rels[0].kind, RelationshipKind::Uses);
        assert_eq!(rels[0].target, "Playbook:SubPlaybook");
        assert!(rels[0].mandatorily);

        // skipunavailable makes the reference optional
        assert_eq!(rels[1].kind, RelationshipKind::UsesCommandOrScript);
        assert_eq!(rels[1].target, "ParseEmail");
        assert!(!rels[1].mandatorily);

        assert_eq!(rels[2].target, "ad-get-user");
        assert!(rels[2].mandatorily);
    }

    #[test]
    fn test_missing_id_is_a_parse_error() {
        let file = write_yml("name: NoId\n");
        assert!(PlaybookParser::from_path(file.path(), &MarketplaceSet::all()).is_err());
    }
}
