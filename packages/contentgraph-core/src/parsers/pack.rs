//! Pack parser.
//!
//! Turns one pack directory into a batch of node and relationship records.
//! The parser never writes to the store; it owns the records it produces
//! until the build driver hands them to the graph loader.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{marketplaces_from, parse_content_item, ContentFolder, ItemParser};
use crate::shared::models::{
    ContentNode, ContentType, GraphError, Marketplace, MarketplaceSet, Relationship,
    RelationshipKind, Result,
};

/// Metadata file every pack must carry at its root.
pub const PACK_METADATA_FILENAME: &str = "pack_metadata.json";

/// Pack metadata as declared on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "currentVersion")]
    pub current_version: String,
    #[serde(default)]
    pub support: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub marketplaces: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "useCases")]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl PackMetadata {
    /// Support tiers maintained by the vendor or a partner count as certified.
    pub fn certification(&self) -> &'static str {
        match self.support.to_ascii_lowercase().as_str() {
            "xsoar" | "partner" => "certified",
            _ => "",
        }
    }
}

/// Everything one pack contributes to the graph: nodes grouped by kind,
/// relationship records grouped by kind, and the artifact errors collected
/// along the way (consulted by the driver's strict/lenient policy).
#[derive(Debug, Default)]
pub struct PackGraph {
    pub pack_id: String,
    pub pack_node_id: String,
    pub nodes: AHashMap<ContentType, Vec<ContentNode>>,
    pub relationships: AHashMap<RelationshipKind, Vec<Relationship>>,
    pub errors: Vec<GraphError>,
}

impl PackGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.values().map(Vec::len).sum()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.values().map(Vec::len).sum()
    }
}

pub struct PackParser {
    pack_id: String,
    pack_node_id: String,
    path: PathBuf,
    marketplaces: MarketplaceSet,
    graph: PackGraph,
}

impl PackParser {
    /// Parse one pack directory into its graph batch.
    ///
    /// A missing or malformed metadata file fails the pack outright;
    /// per-artifact failures are collected into `PackGraph::errors`.
    pub fn parse(pack_path: &Path) -> Result<PackGraph> {
        let mut parser = Self::open(pack_path)?;
        for folder in ContentFolder::ALL {
            let folder_path = parser.path.join(folder.dir_name());
            if folder_path.is_dir() {
                parser.parse_folder(folder, &folder_path);
            }
        }
        Ok(parser.finish())
    }

    fn open(pack_path: &Path) -> Result<Self> {
        let pack_id = pack_path
            .file_name()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GraphError::config(format!("pack path {:?} has no directory name", pack_path))
            })?;
        debug!(pack = %pack_id, "parsing pack");

        let metadata_path = pack_path.join(PACK_METADATA_FILENAME);
        let text = std::fs::read_to_string(&metadata_path)
            .map_err(|e| GraphError::from(e).with_file(metadata_path.display().to_string()))?;
        let metadata: PackMetadata = serde_json::from_str(&text)
            .map_err(|e| GraphError::from(e).with_file(metadata_path.display().to_string()))?;

        // A pack that declares no marketplaces defaults to the primary one.
        let marketplaces = if metadata.marketplaces.is_empty() {
            Marketplace::Xsoar.into()
        } else {
            marketplaces_from(&metadata.marketplaces, &Marketplace::Xsoar.into())
        };

        let name = if metadata.name.is_empty() {
            pack_id.clone()
        } else {
            metadata.name.clone()
        };
        let pack_node = ContentNode::new(ContentType::Pack, pack_id.clone(), name)
            .with_marketplaces(marketplaces.clone())
            .with_deprecated(metadata.deprecated)
            .with_file_path(pack_path.display().to_string())
            .with_attr("current_version", json!(metadata.current_version))
            .with_attr("support", json!(metadata.support))
            .with_attr("author", json!(metadata.author))
            .with_attr("certification", json!(metadata.certification()))
            .with_attr("tags", json!(metadata.tags))
            .with_attr("use_cases", json!(metadata.use_cases))
            .with_attr("categories", json!(metadata.categories));

        let pack_node_id = pack_node.node_id.clone();
        let mut graph = PackGraph {
            pack_id: pack_id.clone(),
            pack_node_id: pack_node_id.clone(),
            ..PackGraph::default()
        };
        graph.nodes.entry(ContentType::Pack).or_default().push(pack_node);

        Ok(Self {
            pack_id,
            pack_node_id,
            path: pack_path.to_path_buf(),
            marketplaces,
            graph,
        })
    }

    fn parse_folder(&mut self, folder: ContentFolder, folder_path: &Path) {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(folder_path) {
            Ok(iter) => iter.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(e) => {
                self.graph.errors.push(
                    GraphError::from(e).with_file(folder_path.display().to_string()),
                );
                return;
            }
        };
        entries.sort();

        for entry in entries {
            let Some(item_path) = resolve_item_file(&entry) else {
                continue;
            };
            match parse_content_item(folder, &item_path, &self.marketplaces) {
                Ok(Some(item)) => self.add_item(item),
                Ok(None) => {}
                Err(e) => {
                    debug!(pack = %self.pack_id, error = %e, "artifact parse failed");
                    self.graph.errors.push(e);
                }
            }
        }
    }

    /// Record one parsed item: its node under its kind, the `IN_PACK` edge to
    /// the owning pack, and the item's own declared relationships.
    fn add_item(&mut self, item: Box<dyn ItemParser>) {
        let content_type = item.content_type();
        let (node, relationships) = item.into_parts();

        let in_pack = Relationship::new(
            RelationshipKind::InPack,
            node.node_id.clone(),
            node.marketplaces.clone(),
            self.pack_node_id.clone(),
        );
        self.graph
            .relationships
            .entry(RelationshipKind::InPack)
            .or_default()
            .push(in_pack);

        for rel in relationships {
            self.graph
                .relationships
                .entry(rel.kind)
                .or_default()
                .push(rel);
        }
        self.graph.nodes.entry(content_type).or_default().push(node);
    }

    fn finish(self) -> PackGraph {
        self.graph
    }
}

/// Artifacts may live directly in the folder or in a package-style
/// sub-directory holding `<dir_name>.yml` next to its code.
fn resolve_item_file(entry: &Path) -> Option<PathBuf> {
    if entry.is_file() {
        return Some(entry.to_path_buf());
    }
    if entry.is_dir() {
        let base = entry.file_name()?.to_str()?;
        for ext in ["yml", "yaml", "json"] {
            let candidate = entry.join(format!("{base}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}
