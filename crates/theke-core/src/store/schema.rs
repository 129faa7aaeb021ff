//! SQLite schema DDL and version stamp for the catalog.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::errors::{ThekeError, ThekeResult};

/// Schema version written by this build. A catalog stamped with a newer
/// version is refused.
pub const SCHEMA_VERSION: i32 = 1;

/// Core DDL statements: 9 CREATE TABLE + 4 CREATE INDEX.
///
/// Executed with `CREATE … IF NOT EXISTS` so they are safe to replay on an
/// already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables (9) ──────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS catalog_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        contentKind TEXT NOT NULL,
        version TEXT NOT NULL DEFAULT '0',
        lang TEXT NOT NULL DEFAULT '',
        uri TEXT
    );",
    "CREATE TABLE IF NOT EXISTS sourceDescriptions (
        sourceId INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
        description TEXT NOT NULL,
        lang TEXT NOT NULL DEFAULT '',
        UNIQUE(sourceId, lang)
    );",
    "CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        sectionCount INTEGER NOT NULL DEFAULT 0,
        testament INTEGER
    );",
    "CREATE TABLE IF NOT EXISTS documentDescriptions (
        documentId INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        description TEXT NOT NULL,
        lang TEXT NOT NULL DEFAULT '',
        UNIQUE(documentId, lang)
    );",
    "CREATE TABLE IF NOT EXISTS editions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        shortName TEXT NOT NULL,
        lang TEXT NOT NULL DEFAULT ''
    );",
    "CREATE TABLE IF NOT EXISTS documentNames (
        documentId INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        editionId INTEGER NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        isShortName INTEGER NOT NULL DEFAULT 0,
        UNIQUE(editionId, name)
    );",
    "CREATE TABLE IF NOT EXISTS link_document_source (
        documentId INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        sourceId INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
        PRIMARY KEY(documentId, sourceId)
    );",
    // ── indexes (4) ─────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_sources_kind ON sources(kind, contentKind);",
    "CREATE INDEX IF NOT EXISTS idx_document_names_document ON documentNames(documentId);",
    "CREATE INDEX IF NOT EXISTS idx_document_names_name ON documentNames(name);",
    "CREATE INDEX IF NOT EXISTS idx_link_source ON link_document_source(sourceId);",
];

/// Enable foreign keys, replay the DDL and stamp the schema version.
pub fn init_schema(conn: &Connection) -> ThekeResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    migrate_schema(conn)
}

/// Check the stored schema version and stamp an unversioned database with
/// [`SCHEMA_VERSION`]. The stamp and its history row share one SAVEPOINT.
pub fn migrate_schema(conn: &Connection) -> ThekeResult<()> {
    let current = get_schema_version(conn);
    if current == SCHEMA_VERSION {
        return Ok(());
    }
    if current > SCHEMA_VERSION {
        return Err(ThekeError::CatalogIntegrity(format!(
            "catalog schema v{current} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    conn.execute_batch("SAVEPOINT theke_schema_stamp;")?;
    let stamped = set_schema_version(conn, SCHEMA_VERSION)
        .and_then(|()| record_migration_step(conn, current, SCHEMA_VERSION, "success", None));
    match stamped {
        Ok(()) => {
            conn.execute_batch("RELEASE SAVEPOINT theke_schema_stamp;")?;
            debug!(from = current, to = SCHEMA_VERSION, "catalog schema stamped");
            Ok(())
        }
        Err(e) => {
            warn!(from = current, to = SCHEMA_VERSION, error = %e, "catalog schema stamp failed");
            let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT theke_schema_stamp;");
            let _ = conn.execute_batch("RELEASE SAVEPOINT theke_schema_stamp;");
            Err(e)
        }
    }
}

/// Read the current schema version from `catalog_meta`.
/// Returns 0 when the key is absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM catalog_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> ThekeResult<()> {
    conn.execute(
        "INSERT INTO catalog_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> ThekeResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}
