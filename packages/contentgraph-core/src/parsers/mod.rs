//! Content item parsers.
//!
//! One parser per artifact kind, all behind the [`ItemParser`] capability
//! trait. The factory dispatches on the pack sub-folder and the file
//! extension; files it does not recognize yield `None` rather than an error.
//! Adding an artifact kind means adding one parser and one folder variant,
//! the call sites stay untouched.

mod classifier;
mod integration;
mod job;
mod pack;
mod playbook;
mod script;

pub use classifier::ClassifierParser;
pub use integration::IntegrationParser;
pub use job::JobParser;
pub use pack::{PackGraph, PackMetadata, PackParser, PACK_METADATA_FILENAME};
pub use playbook::PlaybookParser;
pub use script::ScriptParser;

use std::path::Path;

use tracing::warn;

use crate::shared::models::{
    ContentNode, ContentType, GraphError, Marketplace, MarketplaceSet, Relationship, Result,
    DEFAULT_FROMVERSION, DEFAULT_TOVERSION,
};

/// Artifact-producing sub-folder of a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFolder {
    Integrations,
    Scripts,
    Playbooks,
    Jobs,
    Classifiers,
}

impl ContentFolder {
    pub const ALL: [ContentFolder; 5] = [
        ContentFolder::Integrations,
        ContentFolder::Scripts,
        ContentFolder::Playbooks,
        ContentFolder::Jobs,
        ContentFolder::Classifiers,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ContentFolder::Integrations => "Integrations",
            ContentFolder::Scripts => "Scripts",
            ContentFolder::Playbooks => "Playbooks",
            ContentFolder::Jobs => "Jobs",
            ContentFolder::Classifiers => "Classifiers",
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            ContentFolder::Integrations => ContentType::Integration,
            ContentFolder::Scripts => ContentType::Script,
            ContentFolder::Playbooks => ContentType::Playbook,
            ContentFolder::Jobs => ContentType::Job,
            ContentFolder::Classifiers => ContentType::Classifier,
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "Integrations" => Some(ContentFolder::Integrations),
            "Scripts" => Some(ContentFolder::Scripts),
            "Playbooks" => Some(ContentFolder::Playbooks),
            "Jobs" => Some(ContentFolder::Jobs),
            "Classifiers" => Some(ContentFolder::Classifiers),
            _ => None,
        }
    }
}

/// Capability interface of a parsed content item.
///
/// Implementations hold the node record and the outgoing relationship
/// records they extracted from one artifact file.
pub trait ItemParser: Send {
    fn content_type(&self) -> ContentType;

    fn node(&self) -> &ContentNode;

    fn relationships(&self) -> &[Relationship];

    fn node_id(&self) -> &str {
        &self.node().node_id
    }

    /// Consume the parser, yielding its node and relationship records.
    fn into_parts(self: Box<Self>) -> (ContentNode, Vec<Relationship>);
}

/// Parse one artifact file, dispatching on its folder and extension.
///
/// Returns `Ok(None)` for files that are not recognized artifacts (readme
/// files, images, test data). A recognized but malformed file is a `Parse`
/// error carrying the file path.
pub fn parse_content_item(
    folder: ContentFolder,
    path: &Path,
    pack_marketplaces: &MarketplaceSet,
) -> Result<Option<Box<dyn ItemParser>>> {
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(name) => name,
        None => return Ok(None),
    };
    if is_ignored_file(file_name) {
        return Ok(None);
    }
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let parser: Box<dyn ItemParser> = match (folder, ext.as_str()) {
        (ContentFolder::Integrations, "yml" | "yaml") => {
            Box::new(IntegrationParser::from_path(path, pack_marketplaces)?)
        }
        (ContentFolder::Scripts, "yml" | "yaml") => {
            Box::new(ScriptParser::from_path(path, pack_marketplaces)?)
        }
        (ContentFolder::Playbooks, "yml" | "yaml") => {
            Box::new(PlaybookParser::from_path(path, pack_marketplaces)?)
        }
        (ContentFolder::Jobs, "json") => Box::new(JobParser::from_path(path, pack_marketplaces)?),
        (ContentFolder::Classifiers, "json") => {
            Box::new(ClassifierParser::from_path(path, pack_marketplaces)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(parser))
}

fn is_ignored_file(file_name: &str) -> bool {
    file_name.starts_with('.')
        || file_name.eq_ignore_ascii_case("readme.md")
        || file_name.contains("_test")
        || file_name.starts_with("test-")
}

// ============================================================
// Field extraction helpers shared by the item parsers
// ============================================================

pub(crate) fn read_yaml(path: &Path) -> Result<serde_yaml::Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| GraphError::from(e).with_file(path.display().to_string()))?;
    serde_yaml::from_str(&text)
        .map_err(|e| GraphError::from(e).with_file(path.display().to_string()))
}

pub(crate) fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| GraphError::from(e).with_file(path.display().to_string()))?;
    serde_json::from_str(&text)
        .map_err(|e| GraphError::from(e).with_file(path.display().to_string()))
}

pub(crate) fn yaml_str(value: &serde_yaml::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

pub(crate) fn yaml_bool(value: &serde_yaml::Value, key: &str) -> bool {
    value.get(key).and_then(serde_yaml::Value::as_bool).unwrap_or(false)
}

pub(crate) fn yaml_string_seq(value: &serde_yaml::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(serde_yaml::Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

pub(crate) fn json_bool(value: &serde_json::Value, key: &str) -> bool {
    value.get(key).and_then(serde_json::Value::as_bool).unwrap_or(false)
}

/// Resolve an item's marketplace set from its declared list.
///
/// Unknown names are dropped with a warning; an absent or fully unknown list
/// inherits the owning pack's set.
pub(crate) fn marketplaces_from(names: &[String], pack: &MarketplaceSet) -> MarketplaceSet {
    if names.is_empty() {
        return pack.clone();
    }
    let mut set = MarketplaceSet::new();
    for name in names {
        match Marketplace::parse(name) {
            Some(mp) => {
                set.insert(mp);
            }
            None => warn!(marketplace = %name, "ignoring unknown marketplace"),
        }
    }
    if set.is_empty() {
        pack.clone()
    } else {
        set
    }
}

/// Version bounds with defaults, accepting both key spellings.
pub(crate) fn yaml_versions(value: &serde_yaml::Value) -> (String, String) {
    let from = yaml_str(value, "fromversion")
        .or_else(|| yaml_str(value, "fromVersion"))
        .unwrap_or_else(|| DEFAULT_FROMVERSION.to_string());
    let to = yaml_str(value, "toversion")
        .or_else(|| yaml_str(value, "toVersion"))
        .unwrap_or_else(|| DEFAULT_TOVERSION.to_string());
    (from, to)
}

pub(crate) fn json_versions(value: &serde_json::Value) -> (String, String) {
    let from = json_str(value, "fromVersion")
        .or_else(|| json_str(value, "fromversion"))
        .unwrap_or_else(|| DEFAULT_FROMVERSION.to_string());
    let to = json_str(value, "toVersion")
        .or_else(|| json_str(value, "toversion"))
        .unwrap_or_else(|| DEFAULT_TOVERSION.to_string());
    (from, to)
}

/// A dependency entry may be spelled `<brand>|||<command>`; only the command
/// part identifies the target.
pub(crate) fn normalize_command(name: &str) -> &str {
    name.rsplit("|||").next().unwrap_or(name).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_dispatch_round_trip() {
        for folder in ContentFolder::ALL {
            assert_eq!(ContentFolder::from_dir_name(folder.dir_name()), Some(folder));
        }
        assert_eq!(ContentFolder::from_dir_name("Layouts"), None);
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("ad-get-user"), "ad-get-user");
        assert_eq!(normalize_command("Active Directory|||ad-get-user"), "ad-get-user");
        assert_eq!(normalize_command("Builtin|||setIncident "), "setIncident");
    }

    #[test]
    fn test_marketplaces_inherit_and_filter() {
        let pack: MarketplaceSet = Marketplace::Xpanse.into();

        // Absent list inherits the pack set
        assert_eq!(marketplaces_from(&[], &pack), pack);

        // Unknown names are dropped
        let declared = vec!["xsoar".to_string(), "weird".to_string()];
        let set = marketplaces_from(&declared, &pack);
        assert_eq!(set.len(), 1);
        assert!(set.contains(Marketplace::Xsoar));

        // A fully unknown list falls back to the pack set
        let declared = vec!["weird".to_string()];
        assert_eq!(marketplaces_from(&declared, &pack), pack);
    }

    #[test]
    fn test_ignored_files() {
        assert!(is_ignored_file(".pack-ignore"));
        assert!(is_ignored_file("README.md"));
        assert!(is_ignored_file("script-Foo_test.yml"));
        assert!(!is_ignored_file("script-Foo.yml"));
    }
}
