//! SQLite adapter for the content graph store port.
//!
//! Two tables: `content_nodes` keyed by `node_id` and
//! `content_relationships` keyed by `(source, kind, target)`. Marketplace
//! sets and attribute bags are stored as JSON columns. Every mutating call
//! runs inside one transaction, so a batch applies fully or not at all.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use contentgraph_core::graph::ports::{ContentGraphStore, DependencyConfig, GraphStats};
use contentgraph_core::{
    node_id_of, ContentNode, ContentType, GraphError, Marketplace, MarketplaceSet, Relationship,
    RelationshipKind, Result, SchemaRegistry, StoredRelationship, DEFAULT_FROMVERSION,
    DEFAULT_TOVERSION,
};

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;
        info!(path = %path.as_ref().display(), "opened sqlite graph store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private database, useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GraphError::internal("sqlite connection mutex poisoned"))
    }
}

/// Lock contention is transient and worth retrying; everything else is a
/// permanent store failure.
fn db_err(e: rusqlite::Error) -> GraphError {
    use rusqlite::ErrorCode;
    let transient = matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    );
    if transient {
        GraphError::unavailable(format!("SQLite busy: {e}")).with_source(e)
    } else {
        GraphError::store(format!("SQLite error: {e}")).with_source(e)
    }
}

fn set_to_json(set: &MarketplaceSet) -> Result<String> {
    serde_json::to_string(set)
        .map_err(|e| GraphError::store(format!("failed to encode marketplaces: {e}")))
}

fn set_from_json(json: &str) -> Result<MarketplaceSet> {
    serde_json::from_str(json)
        .map_err(|e| GraphError::store(format!("failed to decode marketplaces: {e}")))
}

/// Raw node row, converted outside the rusqlite result path.
struct NodeRow {
    node_id: String,
    content_type: String,
    id: String,
    name: String,
    deprecated: bool,
    marketplaces: String,
    fromversion: String,
    toversion: String,
    file_path: Option<String>,
    attrs: String,
}

impl NodeRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            node_id: row.get(0)?,
            content_type: row.get(1)?,
            id: row.get(2)?,
            name: row.get(3)?,
            deprecated: row.get(4)?,
            marketplaces: row.get(5)?,
            fromversion: row.get(6)?,
            toversion: row.get(7)?,
            file_path: row.get(8)?,
            attrs: row.get(9)?,
        })
    }

    fn into_node(self) -> Result<ContentNode> {
        let content_type = ContentType::parse(&self.content_type).ok_or_else(|| {
            GraphError::store(format!(
                "unknown content type {:?} on node {}",
                self.content_type, self.node_id
            ))
        })?;
        Ok(ContentNode {
            node_id: self.node_id,
            id: self.id,
            content_type,
            name: self.name,
            deprecated: self.deprecated,
            marketplaces: set_from_json(&self.marketplaces)?,
            fromversion: self.fromversion,
            toversion: self.toversion,
            file_path: self.file_path,
            attrs: serde_json::from_str(&self.attrs)
                .map_err(|e| GraphError::store(format!("failed to decode attrs: {e}")))?,
        })
    }
}

const SELECT_NODE_COLUMNS: &str = "node_id, content_type, id, name, deprecated, marketplaces, \
     fromversion, toversion, file_path, attrs";

/// Merge one edge occurrence. Returns `true` when the edge was created.
fn merge_edge(
    tx: &Transaction<'_>,
    kind: RelationshipKind,
    source: &str,
    target: &str,
    mandatorily: bool,
    deprecated: bool,
    marketplaces: Option<&MarketplaceSet>,
) -> Result<bool> {
    let existing: Option<(bool, bool, String)> = tx
        .query_row(
            "SELECT mandatorily, deprecated, marketplaces FROM content_relationships \
             WHERE source_node_id = ?1 AND kind = ?2 AND target_node_id = ?3",
            params![source, kind.as_str(), target],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(db_err)?;

    let (folded_mandatorily, folded_deprecated, folded_marketplaces, created) = match existing {
        Some((was_mandatory, was_deprecated, old_set)) => {
            let set = match marketplaces {
                Some(set) => set_to_json(set)?,
                None => old_set,
            };
            (
                was_mandatory || mandatorily,
                was_deprecated || deprecated,
                set,
                false,
            )
        }
        None => {
            let set = set_to_json(marketplaces.unwrap_or(&MarketplaceSet::new()))?;
            (mandatorily, deprecated, set, true)
        }
    };

    tx.execute(
        "INSERT OR REPLACE INTO content_relationships \
         (source_node_id, kind, target_node_id, mandatorily, deprecated, marketplaces) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            source,
            kind.as_str(),
            target,
            folded_mandatorily,
            folded_deprecated,
            folded_marketplaces
        ],
    )
    .map_err(db_err)?;
    Ok(created)
}

/// `(content_type, id, marketplaces)` of a node, if present.
fn fetch_node_key(
    tx: &Transaction<'_>,
    node_id: &str,
) -> Result<Option<(String, String, MarketplaceSet)>> {
    let row: Option<(String, String, String)> = tx
        .query_row(
            "SELECT content_type, id, marketplaces FROM content_nodes WHERE node_id = ?1",
            params![node_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(db_err)?;
    match row {
        Some((content_type, id, set)) => Ok(Some((content_type, id, set_from_json(&set)?))),
        None => Ok(None),
    }
}

fn node_exists(tx: &Transaction<'_>, node_id: &str) -> Result<bool> {
    Ok(fetch_node_key(tx, node_id)?.is_some())
}

#[async_trait]
impl ContentGraphStore for SqliteGraphStore {
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS content_nodes (
                node_id      TEXT PRIMARY KEY,
                content_type TEXT NOT NULL,
                id           TEXT NOT NULL,
                name         TEXT NOT NULL,
                deprecated   INTEGER NOT NULL DEFAULT 0,
                marketplaces TEXT NOT NULL,
                fromversion  TEXT NOT NULL,
                toversion    TEXT NOT NULL,
                file_path    TEXT,
                attrs        TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS content_relationships (
                source_node_id TEXT NOT NULL,
                kind           TEXT NOT NULL,
                target_node_id TEXT NOT NULL,
                mandatorily    INTEGER NOT NULL DEFAULT 0,
                deprecated     INTEGER NOT NULL DEFAULT 0,
                marketplaces   TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (source_node_id, kind, target_node_id)
            );
            CREATE INDEX IF NOT EXISTS idx_relationships_kind
                ON content_relationships(kind);",
        )
        .map_err(db_err)?;

        // Property indexes declared by the schema registry
        for schema in SchemaRegistry::global().node_schemas() {
            for prop in schema.indexed {
                if matches!(*prop, "id" | "name") {
                    conn.execute_batch(&format!(
                        "CREATE INDEX IF NOT EXISTS idx_nodes_{prop} \
                         ON content_nodes(content_type, {prop});"
                    ))
                    .map_err(db_err)?;
                }
            }
        }
        debug!("sqlite schema ready");
        Ok(())
    }

    async fn upsert_nodes(
        &self,
        content_type: ContentType,
        batch: Vec<ContentNode>,
    ) -> Result<usize> {
        SchemaRegistry::global().validate_nodes(content_type, &batch)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        let count = batch.len();
        for node in batch {
            // New attribute keys overwrite old ones, untouched keys survive
            let existing_attrs: Option<String> = tx
                .query_row(
                    "SELECT attrs FROM content_nodes WHERE node_id = ?1",
                    params![node.node_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            let attrs = match existing_attrs {
                Some(json) => {
                    let mut merged: HashMap<String, serde_json::Value> =
                        serde_json::from_str(&json).map_err(|e| {
                            GraphError::store(format!("failed to decode attrs: {e}"))
                        })?;
                    for (key, value) in node.attrs.clone() {
                        merged.insert(key, value);
                    }
                    serde_json::to_string(&merged)
                        .map_err(|e| GraphError::store(format!("failed to encode attrs: {e}")))?
                }
                None => serde_json::to_string(&node.attrs)
                    .map_err(|e| GraphError::store(format!("failed to encode attrs: {e}")))?,
            };

            tx.execute(
                "INSERT OR REPLACE INTO content_nodes \
                 (node_id, content_type, id, name, deprecated, marketplaces, \
                  fromversion, toversion, file_path, attrs) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    node.node_id,
                    node.content_type.as_str(),
                    node.id,
                    node.name,
                    node.deprecated,
                    set_to_json(&node.marketplaces)?,
                    node.fromversion,
                    node.toversion,
                    node.file_path,
                    attrs
                ],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(count)
    }

    async fn upsert_relationships(
        &self,
        kind: RelationshipKind,
        batch: Vec<Relationship>,
    ) -> Result<usize> {
        SchemaRegistry::global().validate_relationships(kind, &batch)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        let mut touched = 0;

        for rel in batch {
            if !node_exists(&tx, &rel.source_node_id)? {
                warn!(source = %rel.source_node_id, kind = %kind, "skipping edge from unknown source");
                continue;
            }
            match kind {
                RelationshipKind::HasCommand => {
                    let command_node_id = node_id_of(ContentType::Command, &rel.target);
                    match fetch_node_key(&tx, &command_node_id)? {
                        Some((_, _, mut set)) => {
                            set.union_with(&rel.source_marketplaces);
                            tx.execute(
                                "UPDATE content_nodes SET marketplaces = ?1 WHERE node_id = ?2",
                                params![set_to_json(&set)?, command_node_id],
                            )
                            .map_err(db_err)?;
                        }
                        None => {
                            tx.execute(
                                "INSERT INTO content_nodes \
                                 (node_id, content_type, id, name, deprecated, marketplaces, \
                                  fromversion, toversion, file_path, attrs) \
                                 VALUES (?1, 'Command', ?2, ?3, 0, ?4, ?5, ?6, NULL, '{}')",
                                params![
                                    command_node_id,
                                    rel.target,
                                    rel.target,
                                    set_to_json(&rel.source_marketplaces)?,
                                    DEFAULT_FROMVERSION,
                                    DEFAULT_TOVERSION
                                ],
                            )
                            .map_err(db_err)?;
                        }
                    }
                    merge_edge(
                        &tx,
                        RelationshipKind::HasCommand,
                        &rel.source_node_id,
                        &command_node_id,
                        false,
                        rel.deprecated,
                        None,
                    )?;
                    touched += 1;
                }
                RelationshipKind::UsesCommandOrScript => {
                    let candidates: Vec<String> = {
                        let mut stmt = tx
                            .prepare(
                                "SELECT node_id, marketplaces FROM content_nodes \
                                 WHERE id = ?1 AND content_type IN ('Command', 'Script') \
                                 ORDER BY node_id",
                            )
                            .map_err(db_err)?;
                        let rows = stmt
                            .query_map(params![rel.target], |row| {
                                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                            })
                            .map_err(db_err)?
                            .collect::<rusqlite::Result<Vec<_>>>()
                            .map_err(db_err)?;
                        let mut resolved = Vec::new();
                        for (node_id, set) in rows {
                            if set_from_json(&set)?.intersects(&rel.source_marketplaces) {
                                resolved.push(node_id);
                            }
                        }
                        resolved
                    };
                    if candidates.is_empty() {
                        debug!(
                            source = %rel.source_node_id,
                            target = %rel.target,
                            "dependency not resolvable in source marketplaces"
                        );
                    }
                    for candidate in candidates {
                        merge_edge(
                            &tx,
                            RelationshipKind::Uses,
                            &rel.source_node_id,
                            &candidate,
                            rel.mandatorily,
                            rel.deprecated,
                            None,
                        )?;
                        touched += 1;
                    }
                }
                RelationshipKind::Uses => {
                    let resolvable = match fetch_node_key(&tx, &rel.target)? {
                        Some((_, _, set)) => set.intersects(&rel.source_marketplaces),
                        None => false,
                    };
                    if !resolvable {
                        debug!(
                            source = %rel.source_node_id,
                            target = %rel.target,
                            "dependency not resolvable in source marketplaces"
                        );
                        continue;
                    }
                    merge_edge(
                        &tx,
                        RelationshipKind::Uses,
                        &rel.source_node_id,
                        &rel.target,
                        rel.mandatorily,
                        rel.deprecated,
                        None,
                    )?;
                    touched += 1;
                }
                RelationshipKind::InPack => {
                    if !node_exists(&tx, &rel.target)? {
                        warn!(target = %rel.target, "skipping IN_PACK edge to unknown pack");
                        continue;
                    }
                    merge_edge(
                        &tx,
                        RelationshipKind::InPack,
                        &rel.source_node_id,
                        &rel.target,
                        false,
                        rel.deprecated,
                        None,
                    )?;
                    touched += 1;
                }
                RelationshipKind::DependsOn => {
                    let (Some((_, _, source_set)), Some((_, _, target_set))) = (
                        fetch_node_key(&tx, &rel.source_node_id)?,
                        fetch_node_key(&tx, &rel.target)?,
                    ) else {
                        continue;
                    };
                    let common = source_set.intersection(&target_set);
                    merge_edge(
                        &tx,
                        RelationshipKind::DependsOn,
                        &rel.source_node_id,
                        &rel.target,
                        rel.mandatorily,
                        false,
                        Some(&common),
                    )?;
                    touched += 1;
                }
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(touched)
    }

    async fn run_marketplace_pass(&self, marketplace: Marketplace) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        // Snapshot the pre-pass state, compute removals, then apply
        let nodes: Vec<(String, String, String, MarketplaceSet)> = {
            let mut stmt = tx
                .prepare("SELECT node_id, content_type, id, marketplaces FROM content_nodes")
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            let mut parsed = Vec::with_capacity(rows.len());
            for (node_id, content_type, id, set) in rows {
                parsed.push((node_id, content_type, id, set_from_json(&set)?));
            }
            parsed
        };
        let by_id: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, (node_id, ..))| (node_id.as_str(), i))
            .collect();

        let mandatory_uses: Vec<(String, String)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT source_node_id, target_node_id FROM content_relationships \
                     WHERE kind = 'USES' AND mandatorily = 1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            rows
        };
        let mut uses_by_source: HashMap<&str, Vec<&str>> = HashMap::new();
        for (source, target) in &mandatory_uses {
            uses_by_source
                .entry(source.as_str())
                .or_default()
                .push(target.as_str());
        }

        let mut to_remove: Vec<(String, MarketplaceSet)> = Vec::new();
        for (node_id, _, _, set) in &nodes {
            if !set.contains(marketplace) {
                continue;
            }
            let Some(targets) = uses_by_source.get(node_id.as_str()) else {
                continue;
            };
            let prune = targets.iter().any(|target| {
                let Some(&dep_idx) = by_id.get(*target) else {
                    return false;
                };
                let (dep_id, dep_type, dep_local_id, dep_set) = &nodes[dep_idx];
                if dep_set.contains(marketplace) {
                    return false;
                }
                let has_alternative = nodes.iter().any(|(other_id, other_type, other_local, other_set)| {
                    other_id != dep_id
                        && other_type == dep_type
                        && other_local == dep_local_id
                        && other_set.contains(marketplace)
                });
                !has_alternative
            });
            if prune {
                let mut shrunk = set.clone();
                shrunk.remove(marketplace);
                to_remove.push((node_id.clone(), shrunk));
            }
        }

        let changed = to_remove.len();
        for (node_id, shrunk) in to_remove {
            tx.execute(
                "UPDATE content_nodes SET marketplaces = ?1 WHERE node_id = ?2",
                params![set_to_json(&shrunk)?, node_id],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        if changed > 0 {
            info!(marketplace = %marketplace, changed, "marketplace pass complete");
        }
        Ok(changed)
    }

    async fn run_dependency_aggregation(&self, config: &DependencyConfig) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let in_pack: HashMap<String, String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT source_node_id, target_node_id FROM content_relationships \
                     WHERE kind = 'IN_PACK'",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?
                .collect::<rusqlite::Result<HashMap<_, _>>>()
                .map_err(db_err)?;
            rows
        };

        let packs: HashMap<String, (String, MarketplaceSet)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT node_id, id, marketplaces FROM content_nodes \
                     WHERE content_type = 'Pack'",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            let mut parsed = HashMap::with_capacity(rows.len());
            for (node_id, id, set) in rows {
                parsed.insert(node_id, (id, set_from_json(&set)?));
            }
            parsed
        };

        let uses: Vec<(String, String, bool)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT source_node_id, target_node_id, mandatorily \
                     FROM content_relationships WHERE kind = 'USES'",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            rows
        };

        let mut pairs: HashMap<(String, String), (bool, MarketplaceSet)> = HashMap::new();
        for (source, target, mandatorily) in uses {
            let (Some(pack_a_id), Some(pack_b_id)) = (in_pack.get(&source), in_pack.get(&target))
            else {
                continue;
            };
            if pack_a_id == pack_b_id {
                continue;
            }
            let (Some((a_id, a_set)), Some((b_id, b_set))) =
                (packs.get(pack_a_id), packs.get(pack_b_id))
            else {
                continue;
            };
            if config.is_ignored(a_id) || config.is_ignored(b_id) {
                continue;
            }
            let common = a_set.intersection(b_set);
            if common.is_empty() {
                continue;
            }
            match pairs.entry((pack_a_id.clone(), pack_b_id.clone())) {
                Entry::Occupied(mut occupied) => {
                    occupied.get_mut().0 = occupied.get().0 || mandatorily;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert((mandatorily, common));
                }
            }
        }

        let mut created = 0;
        for ((source, target), (mandatorily, common)) in pairs {
            if merge_edge(
                &tx,
                RelationshipKind::DependsOn,
                &source,
                &target,
                mandatorily,
                false,
                Some(&common),
            )? {
                created += 1;
            }
        }
        tx.commit().map_err(db_err)?;
        info!(created, "dependency aggregation complete");
        Ok(created)
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<ContentNode>> {
        let conn = self.lock()?;
        let row: Option<NodeRow> = conn
            .query_row(
                &format!("SELECT {SELECT_NODE_COLUMNS} FROM content_nodes WHERE node_id = ?1"),
                params![node_id],
                NodeRow::read,
            )
            .optional()
            .map_err(db_err)?;
        row.map(NodeRow::into_node).transpose()
    }

    async fn nodes_by_type(&self, content_type: ContentType) -> Result<Vec<ContentNode>> {
        let conn = self.lock()?;
        let rows: Vec<NodeRow> = {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_NODE_COLUMNS} FROM content_nodes \
                     WHERE content_type = ?1 ORDER BY node_id"
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![content_type.as_str()], NodeRow::read)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            rows
        };
        rows.into_iter().map(NodeRow::into_node).collect()
    }

    async fn relationships_of_kind(
        &self,
        kind: RelationshipKind,
    ) -> Result<Vec<StoredRelationship>> {
        let conn = self.lock()?;
        let rows: Vec<(String, String, bool, bool, String)> = {
            let mut stmt = conn
                .prepare(
                    "SELECT source_node_id, target_node_id, mandatorily, deprecated, marketplaces \
                     FROM content_relationships WHERE kind = ?1 \
                     ORDER BY source_node_id, target_node_id",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![kind.as_str()], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            rows
        };

        let mut result = Vec::with_capacity(rows.len());
        for (source_node_id, target_node_id, mandatorily, deprecated, set) in rows {
            result.push(StoredRelationship {
                kind,
                source_node_id,
                target_node_id,
                mandatorily,
                deprecated,
                marketplaces: set_from_json(&set)?,
            });
        }
        Ok(result)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let conn = self.lock()?;
        let mut stats = GraphStats::default();

        let node_counts: Vec<(String, i64)> = {
            let mut stmt = conn
                .prepare("SELECT content_type, COUNT(*) FROM content_nodes GROUP BY content_type")
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            rows
        };
        for (kind, count) in node_counts {
            if let Some(content_type) = ContentType::parse(&kind) {
                stats.nodes_by_type.insert(content_type, count as usize);
                stats.total_nodes += count as usize;
            }
        }

        let edge_counts: Vec<(String, i64)> = {
            let mut stmt = conn
                .prepare("SELECT kind, COUNT(*) FROM content_relationships GROUP BY kind")
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            rows
        };
        for (kind, count) in edge_counts {
            if let Some(kind) = RelationshipKind::parse(&kind) {
                stats.relationships_by_kind.insert(kind, count as usize);
                stats.total_relationships += count as usize;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mps(list: &[Marketplace]) -> MarketplaceSet {
        list.iter().copied().collect()
    }

    fn live(content_type: ContentType, id: &str, list: &[Marketplace]) -> ContentNode {
        ContentNode::new(content_type, id, id).with_marketplaces(mps(list))
    }

    async fn open_store() -> SqliteGraphStore {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let store = open_store().await;
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_round_trip() {
        let store = open_store().await;
        let node = live(ContentType::Script, "s1", &[Marketplace::Xsoar])
            .with_versions("6.5.0", "99.99.99")
            .with_file_path("Packs/P/Scripts/s1.yml")
            .with_attr("tags", serde_json::json!(["util"]));
        store
            .upsert_nodes(ContentType::Script, vec![node.clone()])
            .await
            .unwrap();

        let loaded = store.get_node("Script:s1").await.unwrap().unwrap();
        assert_eq!(loaded, node);

        // Second upsert merges instead of duplicating
        store
            .upsert_nodes(ContentType::Script, vec![node])
            .await
            .unwrap();
        assert_eq!(store.stats().await.unwrap().total_nodes, 1);
    }

    #[tokio::test]
    async fn test_attr_merge_keeps_old_keys() {
        let store = open_store().await;
        store
            .upsert_nodes(
                ContentType::Script,
                vec![live(ContentType::Script, "s1", &[Marketplace::Xsoar])
                    .with_attr("tags", serde_json::json!(["a"]))],
            )
            .await
            .unwrap();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![live(ContentType::Script, "s1", &[Marketplace::Xsoar])
                    .with_attr("description", serde_json::json!("d"))],
            )
            .await
            .unwrap();

        let node = store.get_node("Script:s1").await.unwrap().unwrap();
        assert_eq!(node.attrs.get("tags"), Some(&serde_json::json!(["a"])));
        assert_eq!(node.attrs.get("description"), Some(&serde_json::json!("d")));
    }

    #[tokio::test]
    async fn test_command_seed_and_union_parity() {
        // Scenario B, same expectations as the in-memory backend
        let store = open_store().await;
        store
            .upsert_nodes(
                ContentType::Integration,
                vec![
                    live(ContentType::Integration, "i1", &[Marketplace::Xsoar]),
                    live(ContentType::Integration, "i2", &[Marketplace::MarketplaceV2]),
                ],
            )
            .await
            .unwrap();

        for (source, set) in [
            ("Integration:i1", mps(&[Marketplace::Xsoar])),
            ("Integration:i2", mps(&[Marketplace::MarketplaceV2])),
        ] {
            store
                .upsert_relationships(
                    RelationshipKind::HasCommand,
                    vec![Relationship::new(
                        RelationshipKind::HasCommand,
                        source,
                        set,
                        "cmd1",
                    )],
                )
                .await
                .unwrap();
        }

        let cmd = store.get_node("Command:cmd1").await.unwrap().unwrap();
        assert_eq!(
            cmd.marketplaces,
            mps(&[Marketplace::Xsoar, Marketplace::MarketplaceV2])
        );
        assert_eq!(
            store
                .relationships_of_kind(RelationshipKind::HasCommand)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_marketplace_pass_parity() {
        // Scenario A on the sqlite backend
        let store = open_store().await;
        store
            .upsert_nodes(
                ContentType::Integration,
                vec![live(
                    ContentType::Integration,
                    "I",
                    &[Marketplace::Xsoar, Marketplace::MarketplaceV2],
                )],
            )
            .await
            .unwrap();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![live(ContentType::Script, "S", &[Marketplace::MarketplaceV2])],
            )
            .await
            .unwrap();
        store
            .upsert_relationships(
                RelationshipKind::Uses,
                vec![Relationship::new(
                    RelationshipKind::Uses,
                    "Integration:I",
                    mps(&[Marketplace::Xsoar, Marketplace::MarketplaceV2]),
                    "Script:S",
                )
                .mandatorily(true)],
            )
            .await
            .unwrap();

        assert_eq!(
            store.run_marketplace_pass(Marketplace::Xsoar).await.unwrap(),
            1
        );
        let node = store.get_node("Integration:I").await.unwrap().unwrap();
        assert_eq!(node.marketplaces, mps(&[Marketplace::MarketplaceV2]));
        assert_eq!(
            store.run_marketplace_pass(Marketplace::Xsoar).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_dependency_aggregation_parity() {
        let store = open_store().await;
        let x = Marketplace::Xsoar;

        store
            .upsert_nodes(
                ContentType::Pack,
                vec![live(ContentType::Pack, "A", &[x]), live(ContentType::Pack, "B", &[x])],
            )
            .await
            .unwrap();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![
                    live(ContentType::Script, "a1", &[x]),
                    live(ContentType::Script, "b1", &[x]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_relationships(
                RelationshipKind::InPack,
                vec![
                    Relationship::new(RelationshipKind::InPack, "Script:a1", mps(&[x]), "Pack:A"),
                    Relationship::new(RelationshipKind::InPack, "Script:b1", mps(&[x]), "Pack:B"),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_relationships(
                RelationshipKind::Uses,
                vec![
                    Relationship::new(RelationshipKind::Uses, "Script:a1", mps(&[x]), "Script:b1")
                        .mandatorily(true),
                ],
            )
            .await
            .unwrap();

        let created = store
            .run_dependency_aggregation(&DependencyConfig::default())
            .await
            .unwrap();
        assert_eq!(created, 1);

        let deps = store
            .relationships_of_kind(RelationshipKind::DependsOn)
            .await
            .unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].source_node_id, "Pack:A");
        assert_eq!(deps[0].target_node_id, "Pack:B");
        assert!(deps[0].mandatorily);
        assert_eq!(deps[0].marketplaces, mps(&[x]));

        // Re-running merges instead of duplicating
        assert_eq!(
            store
                .run_dependency_aggregation(&DependencyConfig::default())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_schema_violation_rejects_batch() {
        let store = open_store().await;
        let good = live(ContentType::Script, "ok", &[Marketplace::Xsoar]);
        let bad = ContentNode::new(ContentType::Script, "bad", "bad");

        let err = store
            .upsert_nodes(ContentType::Script, vec![good, bad])
            .await
            .unwrap_err();
        assert_eq!(err.kind, contentgraph_core::ErrorKind::Schema);
        assert_eq!(store.stats().await.unwrap().total_nodes, 0);
    }

    #[tokio::test]
    async fn test_graph_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        {
            let store = SqliteGraphStore::open(&path).unwrap();
            store.ensure_schema().await.unwrap();
            store
                .upsert_nodes(
                    ContentType::Pack,
                    vec![live(ContentType::Pack, "P", &[Marketplace::Xsoar])],
                )
                .await
                .unwrap();
        }

        let store = SqliteGraphStore::open(&path).unwrap();
        store.ensure_schema().await.unwrap();
        let node = store.get_node("Pack:P").await.unwrap().unwrap();
        assert_eq!(node.name, "P");
        assert_eq!(node.marketplaces, mps(&[Marketplace::Xsoar]));
    }
}
