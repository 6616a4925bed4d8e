//! SQLite graph store.
//!
//! Each public method opens its own connection so the store is `Sync` and
//! callers never manage connection lifetime. Per-file sync runs inside one
//! transaction: a failure leaves the file's previous state untouched.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

use crate::errors::{TreeRootsError, TreeRootsResult};
use crate::indexer::callgraph::{build_call_edges, NameMatch};
use crate::models::{
    DefinitionKind, DefinitionRecord, Direction, EdgeRecord, FileRecord, FileSync, GraphStats,
    Language, NodeSummary, NodeType, Relation, StoredCallSite, REL_CALLS, REL_DEFINES,
    REL_IMPORTS,
};
use crate::store::schema;
use crate::store::{GraphStore, SyncOutcome};

static RELATIONSHIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{0,63}$").unwrap());

const DEFINITION_COLUMNS: &str = "d.id, d.file_path, d.kind, d.name, d.qualified_name, \
     d.signature, d.source, d.start_line, d.end_line";

const EDGE_COLUMNS: &str =
    "source_id, source_type, target_id, target_type, relationship, properties";

const INSERT_EDGE_SQL: &str = "INSERT OR REPLACE INTO edges ( \
         project, source_id, source_type, target_id, target_type, relationship, \
         owner_path, line_number, properties \
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);";

const DELETE_EDGES_TOUCHING_SQL: &str = "DELETE FROM edges WHERE project = ?1 AND ( \
         (source_type = ?3 AND source_id = ?2) OR (target_type = ?3 AND target_id = ?2) \
     );";

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn row_to_definition(row: &Row<'_>) -> rusqlite::Result<DefinitionRecord> {
    let kind: String = row.get(2)?;
    let kind = DefinitionKind::parse(&kind)
        .ok_or_else(|| conversion_error(2, format!("unknown definition kind {kind}")))?;
    Ok(DefinitionRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        kind,
        name: row.get(3)?,
        qualified_name: row.get(4)?,
        signature: row.get(5)?,
        source: row.get(6)?,
        start_line: row.get::<_, i64>(7)? as usize,
        end_line: row.get::<_, i64>(8)? as usize,
    })
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<EdgeRecord> {
    let source_type: String = row.get(1)?;
    let target_type: String = row.get(3)?;
    let properties: Option<String> = row.get(5)?;
    Ok(EdgeRecord {
        source_id: row.get(0)?,
        source_type: NodeType::parse(&source_type)
            .ok_or_else(|| conversion_error(1, format!("unknown node type {source_type}")))?,
        target_id: row.get(2)?,
        target_type: NodeType::parse(&target_type)
            .ok_or_else(|| conversion_error(3, format!("unknown node type {target_type}")))?,
        relationship: row.get(4)?,
        properties: properties.and_then(|p| serde_json::from_str(&p).ok()),
    })
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ---------------------------------------------------------------------------
// SqliteGraphStore
// ---------------------------------------------------------------------------

/// SQLite-backed [`GraphStore`] scoped to one project key.
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    db_path: PathBuf,
    project: String,
}

impl SqliteGraphStore {
    /// Open (creating if needed) the database at `db_path` and initialise
    /// its schema. `project` scopes every read and write.
    pub fn open(db_path: impl Into<PathBuf>, project: impl Into<String>) -> TreeRootsResult<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            db_path,
            project: project.into(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn connect(&self) -> TreeRootsResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
        Ok(conn)
    }

    fn init_schema(&self) -> TreeRootsResult<()> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        schema::init_schema(&conn, schema::GRAPH_SCHEMA_STATEMENTS)
    }

    fn name_id_pairs(
        &self,
        tx: &Transaction<'_>,
        path: &str,
    ) -> TreeRootsResult<BTreeSet<(String, String)>> {
        let mut stmt = tx.prepare(
            "SELECT name, id FROM definitions WHERE project = ?1 AND file_path = ?2;",
        )?;
        let pairs = stmt
            .query_map(params![self.project, path], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeSet<(String, String)>, _>>()?;
        Ok(pairs)
    }

    fn node_type(&self, conn: &Connection, id: &str) -> TreeRootsResult<Option<NodeType>> {
        let is_definition = conn
            .query_row(
                "SELECT 1 FROM definitions WHERE project = ?1 AND id = ?2 LIMIT 1;",
                params![self.project, id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if is_definition {
            return Ok(Some(NodeType::Definition));
        }
        let is_file = conn
            .query_row(
                "SELECT 1 FROM files WHERE project = ?1 AND path = ?2 LIMIT 1;",
                params![self.project, id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(is_file.then_some(NodeType::File))
    }

    fn count(&self, conn: &Connection, sql: &str) -> TreeRootsResult<usize> {
        let n: i64 = conn.query_row(sql, params![self.project], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn edge_count(&self, conn: &Connection, relationship: &str) -> TreeRootsResult<usize> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE project = ?1 AND relationship = ?2;",
            params![self.project, relationship],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

/// Names whose `(name, id)` membership differs between two snapshots.
fn touched_names(
    before: &BTreeSet<(String, String)>,
    after: &BTreeSet<(String, String)>,
) -> BTreeSet<String> {
    before
        .symmetric_difference(after)
        .map(|(name, _)| name.clone())
        .collect()
}

impl GraphStore for SqliteGraphStore {
    fn file_fingerprints(&self) -> TreeRootsResult<BTreeMap<String, String>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT path, fingerprint FROM files WHERE project = ?1 ORDER BY path;")?;
        let map = stmt
            .query_map(params![self.project], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(map)
    }

    fn file(&self, path: &str) -> TreeRootsResult<Option<FileRecord>> {
        let conn = self.connect()?;
        let result = conn.query_row(
            "SELECT path, fingerprint, language, definition_count, parse_error, \
                    COALESCE(last_indexed_at, '') \
             FROM files WHERE project = ?1 AND path = ?2;",
            params![self.project, path],
            |row| {
                let language: Option<String> = row.get(2)?;
                Ok(FileRecord {
                    path: row.get(0)?,
                    fingerprint: row.get(1)?,
                    language: language.as_deref().and_then(Language::parse),
                    definition_count: row.get::<_, i64>(3)? as usize,
                    parse_error: row.get(4)?,
                    last_indexed_at: row.get(5)?,
                })
            },
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn sync_file(&self, update: &FileSync) -> TreeRootsResult<SyncOutcome> {
        let path = update.path.as_str();
        if let Some(stray) = update.definitions.iter().find(|d| d.file_path != path) {
            return Err(TreeRootsError::InvalidInput(format!(
                "definition {} does not belong to {path}",
                stray.id
            )));
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let before = self.name_id_pairs(&tx, path)?;

        let mut kept_ids: HashSet<&str> = HashSet::new();
        let definitions: Vec<&DefinitionRecord> = update
            .definitions
            .iter()
            .filter(|d| kept_ids.insert(d.id.as_str()))
            .collect();
        let import_targets: BTreeSet<&str> = update
            .import_targets
            .iter()
            .map(String::as_str)
            .filter(|t| *t != path)
            .collect();

        tx.execute(
            "INSERT INTO files ( \
                 project, path, fingerprint, language, definition_count, parse_error, \
                 last_indexed_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP) \
             ON CONFLICT(project, path) DO UPDATE SET \
                 fingerprint = excluded.fingerprint, \
                 language = excluded.language, \
                 definition_count = excluded.definition_count, \
                 parse_error = excluded.parse_error, \
                 last_indexed_at = CURRENT_TIMESTAMP;",
            params![
                self.project,
                path,
                update.fingerprint,
                update.language.map(|l| l.as_str()),
                definitions.len() as i64,
                update.parse_error,
            ],
        )?;

        // Retract everything this file owns.
        tx.execute(
            "DELETE FROM edges WHERE project = ?1 AND owner_path = ?2 \
             AND relationship IN (?3, ?4, ?5);",
            params![self.project, path, REL_DEFINES, REL_IMPORTS, REL_CALLS],
        )?;
        tx.execute(
            "DELETE FROM call_sites WHERE project = ?1 AND file_path = ?2;",
            params![self.project, path],
        )?;
        tx.execute(
            "DELETE FROM import_specifiers WHERE project = ?1 AND file_path = ?2;",
            params![self.project, path],
        )?;
        tx.execute(
            "DELETE FROM definitions WHERE project = ?1 AND file_path = ?2;",
            params![self.project, path],
        )?;

        {
            let mut insert_definition = tx.prepare(
                "INSERT INTO definitions ( \
                     project, id, file_path, name, qualified_name, kind, signature, source, \
                     start_line, end_line \
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            )?;
            let mut insert_edge = tx.prepare(INSERT_EDGE_SQL)?;
            for def in &definitions {
                insert_definition.execute(params![
                    self.project,
                    def.id,
                    path,
                    def.name,
                    def.qualified_name,
                    def.kind.as_str(),
                    def.signature,
                    def.source,
                    def.start_line as i64,
                    def.end_line as i64,
                ])?;
                insert_edge.execute(params![
                    self.project,
                    path,
                    NodeType::File.as_str(),
                    def.id,
                    NodeType::Definition.as_str(),
                    REL_DEFINES,
                    path,
                    def.start_line as i64,
                    Option::<String>::None,
                ])?;
            }
            for target in &import_targets {
                insert_edge.execute(params![
                    self.project,
                    path,
                    NodeType::File.as_str(),
                    target,
                    NodeType::File.as_str(),
                    REL_IMPORTS,
                    path,
                    Option::<i64>::None,
                    Option::<String>::None,
                ])?;
            }

            let mut insert_site = tx.prepare(
                "INSERT INTO call_sites ( \
                     project, file_path, caller_id, callee, arg_count, line_number \
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            )?;
            for site in update
                .calls
                .iter()
                .filter(|s| kept_ids.contains(s.caller_id.as_str()))
            {
                insert_site.execute(params![
                    self.project,
                    path,
                    site.caller_id,
                    site.callee,
                    site.arg_count as i64,
                    site.line as i64,
                ])?;
            }

            let mut insert_specifier = tx.prepare(
                "INSERT OR IGNORE INTO import_specifiers (project, file_path, specifier) \
                 VALUES (?1, ?2, ?3);",
            )?;
            for specifier in &update.import_specifiers {
                insert_specifier.execute(params![self.project, path, specifier])?;
            }

            // Edges into definitions that no longer exist, from any owner.
            let mut delete_touching = tx.prepare(DELETE_EDGES_TOUCHING_SQL)?;
            for (_, id) in &before {
                if !kept_ids.contains(id.as_str()) {
                    delete_touching.execute(params![
                        self.project,
                        id,
                        NodeType::Definition.as_str()
                    ])?;
                }
            }
        }

        tx.commit()?;

        let after: BTreeSet<(String, String)> = definitions
            .iter()
            .map(|d| (d.name.clone(), d.id.clone()))
            .collect();
        debug!(
            path,
            definitions = definitions.len(),
            imports = import_targets.len(),
            "file synced"
        );
        Ok(SyncOutcome {
            touched_names: touched_names(&before, &after),
            definitions: definitions.len(),
            imports: import_targets.len(),
        })
    }

    fn import_specifiers(&self) -> TreeRootsResult<BTreeMap<String, Vec<String>>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, specifier FROM import_specifiers \
             WHERE project = ?1 ORDER BY file_path, rowid;",
        )?;
        let rows = stmt
            .query_map(params![self.project], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (path, specifier) in rows {
            map.entry(path).or_default().push(specifier);
        }
        Ok(map)
    }

    fn replace_imports(&self, path: &str, targets: &[String]) -> TreeRootsResult<bool> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let wanted: BTreeSet<&str> = targets
            .iter()
            .map(String::as_str)
            .filter(|t| *t != path)
            .collect();
        let current: BTreeSet<String> = {
            let mut stmt = tx.prepare(
                "SELECT target_id FROM edges \
                 WHERE project = ?1 AND owner_path = ?2 AND relationship = ?3;",
            )?;
            let rows = stmt
                .query_map(params![self.project, path, REL_IMPORTS], |row| row.get(0))?
                .collect::<Result<BTreeSet<String>, _>>()?;
            rows
        };
        if current.iter().map(String::as_str).eq(wanted.iter().copied()) {
            return Ok(false);
        }

        tx.execute(
            "DELETE FROM edges WHERE project = ?1 AND owner_path = ?2 AND relationship = ?3;",
            params![self.project, path, REL_IMPORTS],
        )?;
        {
            let mut insert_edge = tx.prepare(INSERT_EDGE_SQL)?;
            for target in &wanted {
                insert_edge.execute(params![
                    self.project,
                    path,
                    NodeType::File.as_str(),
                    target,
                    NodeType::File.as_str(),
                    REL_IMPORTS,
                    path,
                    Option::<i64>::None,
                    Option::<String>::None,
                ])?;
            }
        }
        tx.commit()?;
        debug!(path, imports = wanted.len(), "imports re-resolved");
        Ok(true)
    }

    fn link_calls(&self, path: &str) -> TreeRootsResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM edges WHERE project = ?1 AND owner_path = ?2 AND relationship = ?3;",
            params![self.project, path, REL_CALLS],
        )?;

        let edges = {
            let mut site_stmt = tx.prepare(
                "SELECT caller_id, callee, arg_count, line_number FROM call_sites \
                 WHERE project = ?1 AND file_path = ?2 ORDER BY rowid;",
            )?;
            let sites = site_stmt
                .query_map(params![self.project, path], |row| {
                    Ok(StoredCallSite {
                        caller_id: row.get(0)?,
                        callee: row.get(1)?,
                        arg_count: row.get::<_, i64>(2)? as usize,
                        line: row.get::<_, i64>(3)? as usize,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let names: BTreeSet<&str> = sites.iter().map(|s| s.callee.as_str()).collect();
            let mut match_stmt = tx.prepare(
                "SELECT id, file_path FROM definitions WHERE project = ?1 AND name = ?2 \
                 ORDER BY id;",
            )?;
            let mut candidates: BTreeMap<String, Vec<NameMatch>> = BTreeMap::new();
            for name in names {
                let matches = match_stmt
                    .query_map(params![self.project, name], |row| {
                        Ok(NameMatch {
                            id: row.get(0)?,
                            file_path: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                if !matches.is_empty() {
                    candidates.insert(name.to_string(), matches);
                }
            }
            build_call_edges(path, &sites, &candidates)
        };

        {
            let mut insert_edge = tx.prepare(INSERT_EDGE_SQL)?;
            for edge in &edges {
                let properties = serde_json::json!({ "arg_count": edge.arg_count });
                insert_edge.execute(params![
                    self.project,
                    edge.caller_id,
                    NodeType::Definition.as_str(),
                    edge.callee_id,
                    NodeType::Definition.as_str(),
                    REL_CALLS,
                    path,
                    edge.line as i64,
                    properties.to_string(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(edges.len())
    }

    fn prune_file(&self, path: &str) -> TreeRootsResult<Option<SyncOutcome>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM files WHERE project = ?1 AND path = ?2;",
                params![self.project, path],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let before = self.name_id_pairs(&tx, path)?;
        tx.execute(
            "DELETE FROM edges WHERE project = ?1 AND owner_path = ?2;",
            params![self.project, path],
        )?;
        {
            let mut delete_touching = tx.prepare(DELETE_EDGES_TOUCHING_SQL)?;
            delete_touching.execute(params![self.project, path, NodeType::File.as_str()])?;
            for (_, id) in &before {
                delete_touching.execute(params![
                    self.project,
                    id,
                    NodeType::Definition.as_str()
                ])?;
            }
        }
        // Definitions and call sites cascade.
        tx.execute(
            "DELETE FROM files WHERE project = ?1 AND path = ?2;",
            params![self.project, path],
        )?;
        tx.commit()?;

        debug!(path, definitions = before.len(), "file pruned");
        Ok(Some(SyncOutcome {
            touched_names: before.into_iter().map(|(name, _)| name).collect(),
            definitions: 0,
            imports: 0,
        }))
    }

    fn files_calling(&self, names: &BTreeSet<String>) -> TreeRootsResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT file_path FROM call_sites WHERE project = ?1 AND callee = ?2;",
        )?;
        let mut files: BTreeSet<String> = BTreeSet::new();
        for name in names {
            let rows = stmt
                .query_map(params![self.project, name], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            files.extend(rows);
        }
        Ok(files.into_iter().collect())
    }

    fn definition(&self, id: &str) -> TreeRootsResult<Option<DefinitionRecord>> {
        let conn = self.connect()?;
        let result = conn.query_row(
            &format!(
                "SELECT {DEFINITION_COLUMNS} FROM definitions d \
                 WHERE d.project = ?1 AND d.id = ?2;"
            ),
            params![self.project, id],
            row_to_definition,
        );
        match result {
            Ok(def) => Ok(Some(def)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn definitions_in_file(&self, path: &str) -> TreeRootsResult<Vec<DefinitionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM definitions d \
             WHERE d.project = ?1 AND d.file_path = ?2 ORDER BY d.start_line, d.id;"
        ))?;
        let defs = stmt
            .query_map(params![self.project, path], row_to_definition)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(defs)
    }

    fn definitions_by_ids(&self, ids: &[String]) -> TreeRootsResult<Vec<DefinitionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM definitions d WHERE d.project = ?1 AND d.id = ?2;"
        ))?;
        let mut defs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(def) = stmt
                .query_row(params![self.project, id], row_to_definition)
                .optional()?
            {
                defs.push(def);
            }
        }
        Ok(defs)
    }

    fn definition_ids(&self) -> TreeRootsResult<BTreeSet<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id FROM definitions WHERE project = ?1;")?;
        let ids = stmt
            .query_map(params![self.project], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(ids)
    }

    fn neighbors(
        &self,
        id: &str,
        relation: &Relation,
        direction: Direction,
    ) -> TreeRootsResult<Vec<DefinitionRecord>> {
        let (anchor, other) = match direction {
            Direction::Outgoing => ("source_id", "target_id"),
            Direction::Incoming => ("target_id", "source_id"),
        };
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM edges e \
             JOIN definitions d ON d.project = e.project AND d.id = e.{other} \
             WHERE e.project = ?1 AND e.{anchor} = ?2 AND e.relationship = ?3 \
             ORDER BY d.id;"
        ))?;
        let defs = stmt
            .query_map(params![self.project, id, relation.as_str()], row_to_definition)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(defs)
    }

    fn file_neighbors(
        &self,
        path: &str,
        relation: &Relation,
        direction: Direction,
    ) -> TreeRootsResult<Vec<String>> {
        let (anchor, anchor_type, other, other_type) = match direction {
            Direction::Outgoing => ("source_id", "source_type", "target_id", "target_type"),
            Direction::Incoming => ("target_id", "target_type", "source_id", "source_type"),
        };
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {other} FROM edges \
             WHERE project = ?1 AND {anchor} = ?2 AND {anchor_type} = 'file' \
             AND {other_type} = 'file' AND relationship = ?3 \
             ORDER BY {other};"
        ))?;
        let paths = stmt
            .query_map(params![self.project, path, relation.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    fn edges_of(&self, node_id: &str) -> TreeRootsResult<Vec<EdgeRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges \
             WHERE project = ?1 AND (source_id = ?2 OR target_id = ?2) \
             ORDER BY relationship, source_id, target_id;"
        ))?;
        let edges = stmt
            .query_map(params![self.project, node_id], row_to_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    fn edges_by_relation(&self, relation: &Relation) -> TreeRootsResult<Vec<EdgeRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges \
             WHERE project = ?1 AND relationship = ?2 ORDER BY source_id, target_id;"
        ))?;
        let edges = stmt
            .query_map(params![self.project, relation.as_str()], row_to_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relationship: &str,
        properties: Option<serde_json::Value>,
    ) -> TreeRootsResult<EdgeRecord> {
        if !RELATIONSHIP_RE.is_match(relationship) {
            return Err(TreeRootsError::InvalidInput(format!(
                "relationship must be an UPPER_SNAKE identifier, got {relationship:?}"
            )));
        }
        if Relation::from_name(relationship).is_structural() {
            return Err(TreeRootsError::InvalidInput(format!(
                "{relationship} edges are maintained by scans and cannot be created manually"
            )));
        }

        let conn = self.connect()?;
        let source_type = self
            .node_type(&conn, source_id)?
            .ok_or_else(|| TreeRootsError::NodeNotFound(source_id.to_string()))?;
        let target_type = self
            .node_type(&conn, target_id)?
            .ok_or_else(|| TreeRootsError::NodeNotFound(target_id.to_string()))?;

        let serialized = properties.as_ref().map(serde_json::to_string).transpose()?;
        conn.execute(
            INSERT_EDGE_SQL,
            params![
                self.project,
                source_id,
                source_type.as_str(),
                target_id,
                target_type.as_str(),
                relationship,
                Option::<String>::None,
                Option::<i64>::None,
                serialized,
            ],
        )?;

        Ok(EdgeRecord {
            source_id: source_id.to_string(),
            source_type,
            target_id: target_id.to_string(),
            target_type,
            relationship: relationship.to_string(),
            properties,
        })
    }

    fn search_nodes(&self, text: &str, limit: usize) -> TreeRootsResult<Vec<NodeSummary>> {
        let needle = text.trim();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(needle));
        let lowered = needle.to_lowercase();
        let conn = self.connect()?;

        // (exact-name rank, node-type rank, name length, id)
        let mut ranked: Vec<((u8, u8, usize, String), NodeSummary)> = Vec::new();

        let mut def_stmt = conn.prepare(
            "SELECT id, name, file_path, kind FROM definitions \
             WHERE project = ?1 AND (name LIKE ?2 ESCAPE '\\' \
                 OR qualified_name LIKE ?2 ESCAPE '\\' OR id LIKE ?2 ESCAPE '\\') \
             ORDER BY length(name), id LIMIT ?3;",
        )?;
        let defs = def_stmt
            .query_map(params![self.project, pattern, limit as i64], |row| {
                let kind: String = row.get(3)?;
                Ok(NodeSummary {
                    id: row.get(0)?,
                    node_type: NodeType::Definition,
                    name: row.get(1)?,
                    file_path: row.get(2)?,
                    kind: DefinitionKind::parse(&kind),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for node in defs {
            let exact = u8::from(node.name.to_lowercase() != lowered);
            ranked.push(((exact, 0, node.name.len(), node.id.clone()), node));
        }

        let mut file_stmt = conn.prepare(
            "SELECT path FROM files WHERE project = ?1 AND path LIKE ?2 ESCAPE '\\' \
             ORDER BY length(path), path LIMIT ?3;",
        )?;
        let files = file_stmt
            .query_map(params![self.project, pattern, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for path in files {
            let name = file_name(&path).to_string();
            let exact = u8::from(name.to_lowercase() != lowered && path.to_lowercase() != lowered);
            ranked.push((
                (exact, 1, name.len(), path.clone()),
                NodeSummary {
                    id: path.clone(),
                    node_type: NodeType::File,
                    name,
                    file_path: path,
                    kind: None,
                },
            ));
        }

        ranked.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ranked.into_iter().take(limit).map(|(_, node)| node).collect())
    }

    fn stats(&self) -> TreeRootsResult<GraphStats> {
        let conn = self.connect()?;
        let custom: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE project = ?1 AND relationship NOT IN (?2, ?3, ?4);",
            params![self.project, REL_DEFINES, REL_IMPORTS, REL_CALLS],
            |row| row.get(0),
        )?;
        Ok(GraphStats {
            files: self.count(&conn, "SELECT COUNT(*) FROM files WHERE project = ?1;")?,
            definitions: self
                .count(&conn, "SELECT COUNT(*) FROM definitions WHERE project = ?1;")?,
            defines_edges: self.edge_count(&conn, REL_DEFINES)?,
            import_edges: self.edge_count(&conn, REL_IMPORTS)?,
            call_edges: self.edge_count(&conn, REL_CALLS)?,
            custom_edges: custom as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::definition_key;

    fn open_store(dir: &tempfile::TempDir) -> SqliteGraphStore {
        SqliteGraphStore::open(dir.path().join("graph.sqlite"), "/repo").unwrap()
    }

    fn make_definition(path: &str, local_key: &str, name: &str, line: usize) -> DefinitionRecord {
        DefinitionRecord {
            id: definition_key(path, local_key),
            file_path: path.to_string(),
            kind: DefinitionKind::Function,
            name: name.to_string(),
            qualified_name: name.to_string(),
            signature: format!("function {name}()"),
            source: format!("function {name}() {{}}"),
            start_line: line,
            end_line: line,
        }
    }

    fn make_call(caller: &str, callee: &str) -> StoredCallSite {
        StoredCallSite {
            caller_id: caller.to_string(),
            callee: callee.to_string(),
            arg_count: 0,
            line: 1,
        }
    }

    fn file_sync(
        path: &str,
        fingerprint: &str,
        definitions: Vec<DefinitionRecord>,
        imports: &[&str],
        calls: Vec<StoredCallSite>,
    ) -> FileSync {
        FileSync {
            path: path.to_string(),
            fingerprint: fingerprint.to_string(),
            language: Language::from_path(path),
            definitions,
            import_specifiers: Vec::new(),
            import_targets: imports.iter().map(|s| s.to_string()).collect(),
            calls,
            parse_error: None,
        }
    }

    /// Scenario A at the store level: a.ts imports b.ts, foo calls bar.
    fn seed_scenario_a(store: &SqliteGraphStore) {
        store
            .sync_file(&file_sync(
                "a.ts",
                "ha",
                vec![make_definition("a.ts", "foo", "foo", 2)],
                &["b.ts"],
                vec![make_call("a.ts::foo", "bar")],
            ))
            .unwrap();
        store
            .sync_file(&file_sync(
                "b.ts",
                "hb",
                vec![make_definition("b.ts", "bar", "bar", 1)],
                &[],
                vec![],
            ))
            .unwrap();
        store.link_calls("a.ts").unwrap();
        store.link_calls("b.ts").unwrap();
    }

    #[test]
    fn test_two_phase_sync_builds_graph() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        seed_scenario_a(&store);

        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.definitions, 2);
        assert_eq!(stats.defines_edges, 2);
        assert_eq!(stats.import_edges, 1);
        assert_eq!(stats.call_edges, 1);

        let callees = store
            .neighbors("a.ts::foo", &Relation::Calls, Direction::Outgoing)
            .unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].id, "b.ts::bar");
        let callers = store
            .neighbors("b.ts::bar", &Relation::Calls, Direction::Incoming)
            .unwrap();
        assert_eq!(callers[0].id, "a.ts::foo");

        assert_eq!(
            store
                .file_neighbors("a.ts", &Relation::Imports, Direction::Outgoing)
                .unwrap(),
            vec!["b.ts"]
        );
        assert_eq!(
            store
                .file_neighbors("b.ts", &Relation::Imports, Direction::Incoming)
                .unwrap(),
            vec!["a.ts"]
        );

        let calls = store.edges_by_relation(&Relation::Calls).unwrap();
        assert_eq!(calls[0].properties, Some(serde_json::json!({"arg_count": 0})));
    }

    #[test]
    fn test_resync_replaces_instead_of_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        seed_scenario_a(&store);
        let before_edges = store.edges_by_relation(&Relation::Defines).unwrap();

        for _ in 0..3 {
            store
                .sync_file_with_calls(&file_sync(
                    "a.ts",
                    "ha",
                    vec![make_definition("a.ts", "foo", "foo", 2)],
                    &["b.ts", "b.ts"],
                    vec![make_call("a.ts::foo", "bar"), make_call("a.ts::foo", "bar")],
                ))
                .unwrap();
        }
        let stats = store.stats().unwrap();
        assert_eq!(stats.definitions, 2);
        assert_eq!(stats.import_edges, 1);
        assert_eq!(stats.call_edges, 1);
        assert_eq!(store.edges_by_relation(&Relation::Defines).unwrap(), before_edges);
    }

    #[test]
    fn test_incoming_calls_survive_callee_resync() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        seed_scenario_a(&store);

        // b.ts changes but still defines bar; a.ts is not re-linked.
        let outcome = store
            .sync_file(&file_sync(
                "b.ts",
                "hb2",
                vec![
                    make_definition("b.ts", "bar", "bar", 3),
                    make_definition("b.ts", "baz", "baz", 7),
                ],
                &[],
                vec![],
            ))
            .unwrap();
        assert_eq!(outcome.touched_names, BTreeSet::from(["baz".to_string()]));
        assert_eq!(store.stats().unwrap().call_edges, 1);
        assert_eq!(store.definition("b.ts::bar").unwrap().unwrap().start_line, 3);
    }

    #[test]
    fn test_dropped_definition_removes_its_edges() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        seed_scenario_a(&store);

        let outcome = store
            .sync_file(&file_sync("b.ts", "hb2", vec![], &[], vec![]))
            .unwrap();
        assert_eq!(outcome.touched_names, BTreeSet::from(["bar".to_string()]));
        let stats = store.stats().unwrap();
        assert_eq!(stats.definitions, 1);
        assert_eq!(stats.call_edges, 0);
        assert_eq!(
            store.files_calling(&outcome.touched_names).unwrap(),
            vec!["a.ts"]
        );
    }

    #[test]
    fn test_stale_import_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        seed_scenario_a(&store);
        store
            .sync_file_with_calls(&file_sync(
                "a.ts",
                "ha2",
                vec![make_definition("a.ts", "foo", "foo", 2)],
                &[],
                vec![make_call("a.ts::foo", "bar")],
            ))
            .unwrap();
        assert!(store
            .file_neighbors("a.ts", &Relation::Imports, Direction::Outgoing)
            .unwrap()
            .is_empty());
        // The call still resolves project-wide without the import.
        assert_eq!(store.stats().unwrap().call_edges, 1);
    }

    #[test]
    fn test_import_specifiers_and_replace_imports() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let mut update = file_sync("src/a.ts", "ha", vec![], &[], vec![]);
        update.import_specifiers = vec!["./b".to_string(), "react".to_string()];
        store.sync_file(&update).unwrap();
        store
            .sync_file(&file_sync("src/b.ts", "hb", vec![], &[], vec![]))
            .unwrap();

        let specifiers = store.import_specifiers().unwrap();
        assert_eq!(specifiers.len(), 1);
        assert_eq!(specifiers["src/a.ts"], vec!["./b", "react"]);

        let targets = vec!["src/b.ts".to_string()];
        assert!(store.replace_imports("src/a.ts", &targets).unwrap());
        assert!(!store.replace_imports("src/a.ts", &targets).unwrap());
        assert_eq!(
            store
                .file_neighbors("src/a.ts", &Relation::Imports, Direction::Outgoing)
                .unwrap(),
            vec!["src/b.ts"]
        );
        assert!(store.replace_imports("src/a.ts", &[]).unwrap());
        assert_eq!(store.stats().unwrap().import_edges, 0);

        // Specifiers go with their file.
        store.prune_file("src/a.ts").unwrap();
        assert!(store.import_specifiers().unwrap().is_empty());
    }

    #[test]
    fn test_prune_removes_file_definitions_and_edges() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        seed_scenario_a(&store);
        store
            .create_edge("b.ts::bar", "a.ts", "DOCUMENTED_BY", None)
            .unwrap();

        let outcome = store.prune_file("b.ts").unwrap().unwrap();
        assert!(outcome.touched_names.contains("bar"));
        assert!(store.prune_file("b.ts").unwrap().is_none());

        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.definitions, 1);
        assert_eq!(stats.import_edges, 0);
        assert_eq!(stats.call_edges, 0);
        assert_eq!(stats.custom_edges, 0);
        assert!(store.definition("b.ts::bar").unwrap().is_none());
        assert_eq!(
            store.file_fingerprints().unwrap().keys().collect::<Vec<_>>(),
            vec!["a.ts"]
        );
    }

    #[test]
    fn test_ambiguous_callee_produces_no_edge() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        for path in ["x.ts", "y.ts"] {
            store
                .sync_file(&file_sync(
                    path,
                    "h",
                    vec![make_definition(path, "handler", "handler", 1)],
                    &[],
                    vec![],
                ))
                .unwrap();
        }
        store
            .sync_file_with_calls(&file_sync(
                "z.ts",
                "h",
                vec![make_definition("z.ts", "main", "main", 1)],
                &[],
                vec![make_call("z.ts::main", "handler")],
            ))
            .unwrap();
        assert!(store.definition("x.ts::handler").unwrap().is_some());
        assert!(store.definition("y.ts::handler").unwrap().is_some());
        assert_eq!(store.stats().unwrap().call_edges, 0);
    }

    #[test]
    fn test_same_file_match_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store
            .sync_file(&file_sync(
                "y.ts",
                "h",
                vec![make_definition("y.ts", "handler", "handler", 1)],
                &[],
                vec![],
            ))
            .unwrap();
        store
            .sync_file_with_calls(&file_sync(
                "x.ts",
                "h",
                vec![
                    make_definition("x.ts", "handler", "handler", 1),
                    make_definition("x.ts", "main", "main", 5),
                ],
                &[],
                vec![make_call("x.ts::main", "handler")],
            ))
            .unwrap();
        let callees = store
            .neighbors("x.ts::main", &Relation::Calls, Direction::Outgoing)
            .unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].id, "x.ts::handler");
    }

    #[test]
    fn test_create_edge_validation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        seed_scenario_a(&store);

        let edge = store
            .create_edge(
                "a.ts::foo",
                "b.ts",
                "EXPLAINED_BY",
                Some(serde_json::json!({"note": "see docs"})),
            )
            .unwrap();
        assert_eq!(edge.source_type, NodeType::Definition);
        assert_eq!(edge.target_type, NodeType::File);

        let edges = store.edges_of("b.ts").unwrap();
        assert!(edges.iter().any(|e| e.relationship == "EXPLAINED_BY"
            && e.properties == Some(serde_json::json!({"note": "see docs"}))));

        assert!(matches!(
            store.create_edge("a.ts::foo", "nope.ts", "LINKS", None),
            Err(TreeRootsError::NodeNotFound(_))
        ));
        assert!(matches!(
            store.create_edge("a.ts::foo", "b.ts", "CALLS", None),
            Err(TreeRootsError::InvalidInput(_))
        ));
        assert!(matches!(
            store.create_edge("a.ts::foo", "b.ts", "links to", None),
            Err(TreeRootsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_search_nodes_ranks_exact_names_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store
            .sync_file(&file_sync(
                "src/handlers.ts",
                "h",
                vec![
                    make_definition("src/handlers.ts", "handlerFactory", "handlerFactory", 1),
                    make_definition("src/handlers.ts", "handler", "handler", 9),
                ],
                &[],
                vec![],
            ))
            .unwrap();

        let hits = store.search_nodes("HANDLER", 10).unwrap();
        assert_eq!(hits[0].id, "src/handlers.ts::handler");
        assert!(hits.iter().any(|h| h.node_type == NodeType::File));
        assert_eq!(store.search_nodes("handler", 1).unwrap().len(), 1);
        assert!(store.search_nodes("  ", 5).unwrap().is_empty());
        assert!(store.search_nodes("100%", 5).unwrap().is_empty());
    }

    #[test]
    fn test_projects_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("graph.sqlite");
        let one = SqliteGraphStore::open(&db, "/one").unwrap();
        let two = SqliteGraphStore::open(&db, "/two").unwrap();
        one.sync_file(&file_sync(
            "a.ts",
            "h",
            vec![make_definition("a.ts", "foo", "foo", 1)],
            &[],
            vec![],
        ))
        .unwrap();
        assert_eq!(two.stats().unwrap(), GraphStats::default());
        assert_eq!(one.stats().unwrap().definitions, 1);
    }

    #[test]
    fn test_file_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let mut update = file_sync("bad.py", "h1", vec![], &[], vec![]);
        update.parse_error = Some("syntax error near line 3".to_string());
        store.sync_file(&update).unwrap();

        let record = store.file("bad.py").unwrap().unwrap();
        assert_eq!(record.fingerprint, "h1");
        assert_eq!(record.language, Some(Language::Python));
        assert_eq!(record.definition_count, 0);
        assert_eq!(record.parse_error.as_deref(), Some("syntax error near line 3"));
        assert!(store.file("missing.py").unwrap().is_none());
    }
}
