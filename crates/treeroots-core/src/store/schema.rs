//! SQLite schema DDL for the graph and vector stores.
//!
//! Every row is keyed by the project it belongs to, so one database file can
//! serve several project roots.

use rusqlite::Connection;

use crate::errors::{TreeRootsError, TreeRootsResult};

/// Current schema version, recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Graph store DDL.
///
/// Executed with `CREATE … IF NOT EXISTS` so they are safe to replay on an
/// already-initialised database.
pub const GRAPH_SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS files (
        project TEXT NOT NULL,
        path TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        language TEXT,
        definition_count INTEGER NOT NULL DEFAULT 0,
        parse_error TEXT,
        last_indexed_at TEXT DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (project, path)
    );",
    "CREATE TABLE IF NOT EXISTS definitions (
        project TEXT NOT NULL,
        id TEXT NOT NULL,
        file_path TEXT NOT NULL,
        name TEXT NOT NULL,
        qualified_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        signature TEXT NOT NULL DEFAULT '',
        source TEXT NOT NULL DEFAULT '',
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        PRIMARY KEY (project, id),
        FOREIGN KEY (project, file_path) REFERENCES files(project, path) ON DELETE CASCADE
    );",
    "CREATE TABLE IF NOT EXISTS edges (
        project TEXT NOT NULL,
        source_id TEXT NOT NULL,
        source_type TEXT NOT NULL,
        target_id TEXT NOT NULL,
        target_type TEXT NOT NULL,
        relationship TEXT NOT NULL,
        owner_path TEXT,
        line_number INTEGER,
        properties TEXT,
        PRIMARY KEY (project, source_id, target_id, relationship)
    );",
    "CREATE TABLE IF NOT EXISTS call_sites (
        project TEXT NOT NULL,
        file_path TEXT NOT NULL,
        caller_id TEXT NOT NULL,
        callee TEXT NOT NULL,
        arg_count INTEGER NOT NULL DEFAULT 0,
        line_number INTEGER NOT NULL,
        FOREIGN KEY (project, file_path) REFERENCES files(project, path) ON DELETE CASCADE
    );",
    "CREATE TABLE IF NOT EXISTS import_specifiers (
        project TEXT NOT NULL,
        file_path TEXT NOT NULL,
        specifier TEXT NOT NULL,
        PRIMARY KEY (project, file_path, specifier),
        FOREIGN KEY (project, file_path) REFERENCES files(project, path) ON DELETE CASCADE
    );",
    "CREATE INDEX IF NOT EXISTS idx_definitions_name ON definitions(project, name);",
    "CREATE INDEX IF NOT EXISTS idx_definitions_file ON definitions(project, file_path);",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(project, target_id, relationship);",
    "CREATE INDEX IF NOT EXISTS idx_edges_owner ON edges(project, owner_path, relationship);",
    "CREATE INDEX IF NOT EXISTS idx_call_sites_file ON call_sites(project, file_path);",
    "CREATE INDEX IF NOT EXISTS idx_call_sites_callee ON call_sites(project, callee);",
];

/// Vector store DDL.
pub const VECTOR_SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS index_meta (
        project TEXT PRIMARY KEY,
        dimension INTEGER NOT NULL,
        model_id TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS embeddings (
        project TEXT NOT NULL,
        id TEXT NOT NULL,
        file_path TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        vector BLOB NOT NULL,
        payload TEXT NOT NULL,
        PRIMARY KEY (project, id)
    );",
    "CREATE INDEX IF NOT EXISTS idx_embeddings_file ON embeddings(project, file_path);",
];

pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap_or(0)
}

/// Apply `statements` and stamp the schema version. A database stamped by a
/// newer build is refused rather than silently downgraded.
pub fn init_schema(conn: &Connection, statements: &[&str]) -> TreeRootsResult<()> {
    let version = get_schema_version(conn);
    if version > SCHEMA_VERSION {
        return Err(TreeRootsError::InvalidInput(format!(
            "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    conn.execute_batch("SAVEPOINT treeroots_schema;")?;
    let applied = statements
        .iter()
        .try_for_each(|stmt| conn.execute_batch(stmt))
        .and_then(|_| conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};")));
    match applied {
        Ok(()) => {
            conn.execute_batch("RELEASE SAVEPOINT treeroots_schema;")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch(
                "ROLLBACK TO SAVEPOINT treeroots_schema; RELEASE SAVEPOINT treeroots_schema;",
            );
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_initialises() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        init_schema(&conn, GRAPH_SCHEMA_STATEMENTS).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                 AND name IN ('files', 'definitions', 'edges', 'call_sites', 'import_specifiers');",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, VECTOR_SCHEMA_STATEMENTS).unwrap();
        init_schema(&conn, VECTOR_SCHEMA_STATEMENTS).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        let err = init_schema(&conn, GRAPH_SCHEMA_STATEMENTS).unwrap_err();
        assert!(matches!(err, TreeRootsError::InvalidInput(_)));
    }

    #[test]
    fn test_definitions_cascade_with_file() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        init_schema(&conn, GRAPH_SCHEMA_STATEMENTS).unwrap();
        conn.execute(
            "INSERT INTO files(project, path, fingerprint) VALUES ('p', 'a.ts', 'h');",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO definitions(project, id, file_path, name, qualified_name, kind, \
             start_line, end_line) VALUES ('p', 'a.ts::f', 'a.ts', 'f', 'f', 'function', 1, 1);",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM files WHERE project = 'p' AND path = 'a.ts';", [])
            .unwrap();
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM definitions;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }
}
