//! SQLite catalog of sources, documents, editions and their names.
//!
//! The catalog has a single writer: one [`Catalog`] owns one connection and
//! is driven from the owner thread. Reads are plain queries; multi-statement
//! writes go through [`Catalog::transaction`] so they land together.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::errors::{ThekeError, ThekeResult};
use crate::models::{
    ContentKind, DocumentNames, DocumentSource, ExternalDocument, SourceKind, SourceRecord,
    Testament, DEFAULT_EDITION, DEFAULT_EDITION_SHORT, DEFAULT_LANG, VERSION_NEVER_INDEXED,
};
use crate::store::schema::init_schema;

/// Fields written when a source is (re)indexed.
#[derive(Clone, Debug)]
pub struct NewSource<'a> {
    pub name: &'a str,
    pub kind: SourceKind,
    pub content_kind: ContentKind,
    pub version: &'a str,
    pub lang: &'a str,
    pub uri: Option<&'a str>,
    pub description: &'a str,
}

pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Open (creating if needed) the catalog at `path`.
    pub fn open(path: &Path) -> ThekeResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        info!(path = %path.display(), "catalog opened");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> ThekeResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one transaction: committed when it returns `Ok`,
    /// rolled back otherwise.
    pub fn transaction<T, F>(&self, f: F) -> ThekeResult<T>
    where
        F: FnOnce(&Connection) -> ThekeResult<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------------

    /// Stored version of a source, `"0"` when it was never indexed.
    pub fn get_source_version(&self, name: &str) -> ThekeResult<String> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM sources WHERE name = ?1;",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(version.unwrap_or_else(|| VERSION_NEVER_INDEXED.to_string()))
    }

    pub fn get_source(&self, name: &str) -> ThekeResult<Option<SourceRecord>> {
        let mut sources = self.select_sources("WHERE s.name = ?1", params![name])?;
        Ok(sources.pop())
    }

    pub fn list_sources(
        &self,
        kind: Option<SourceKind>,
        content_kind: Option<ContentKind>,
    ) -> ThekeResult<Vec<SourceRecord>> {
        let kind = kind.map(SourceKind::as_str);
        let content_kind = content_kind.map(ContentKind::as_str);
        self.select_sources(
            "WHERE (?1 IS NULL OR s.kind = ?1) AND (?2 IS NULL OR s.contentKind = ?2)",
            params![kind, content_kind],
        )
    }

    fn select_sources(
        &self,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> ThekeResult<Vec<SourceRecord>> {
        let sql = format!(
            "SELECT s.name, s.kind, s.contentKind, s.version, s.lang, s.uri, \
                    COALESCE((SELECT d.description FROM sourceDescriptions d \
                              WHERE d.sourceId = s.id ORDER BY d.lang LIMIT 1), '') \
             FROM sources s {filter} ORDER BY s.name ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (name, kind, content_kind, version, lang, uri, description) = row?;
            out.push(SourceRecord {
                kind: kind.parse()?,
                content_kind: parse_content_kind(&content_kind)?,
                name,
                description,
                version,
                lang,
                uri,
            });
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// Every `(canonical name, source name)` link, in document order.
    pub fn list_documents(&self) -> ThekeResult<Vec<DocumentSource>> {
        let mut stmt = self.conn.prepare(
            "SELECT dn.name, s.name \
             FROM link_document_source l \
             JOIN sources s ON s.id = l.sourceId \
             JOIN documentNames dn ON dn.documentId = l.documentId AND dn.isShortName = 0 \
             JOIN editions e ON e.id = dn.editionId AND e.name = ?1 \
             ORDER BY l.documentId ASC, s.name ASC;",
        )?;
        let rows = stmt.query_map(params![DEFAULT_EDITION], |row| {
            Ok(DocumentSource {
                document: row.get(0)?,
                source: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Names of the sources a document is available from.
    pub fn list_document_sources(&self, name: &str) -> ThekeResult<Vec<String>> {
        let id = self.get_document_id(name)?;
        let mut stmt = self.conn.prepare(
            "SELECT s.name FROM link_document_source l \
             JOIN sources s ON s.id = l.sourceId \
             WHERE l.documentId = ?1 ORDER BY s.name ASC;",
        )?;
        let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_document_id(&self, name: &str) -> ThekeResult<i64> {
        self.conn
            .query_row(
                "SELECT documentId FROM documentNames WHERE name = ?1 \
                 ORDER BY editionId ASC, isShortName ASC LIMIT 1;",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .ok_or_else(|| ThekeError::NotFound(format!("document `{name}`")))
    }

    pub fn get_document_section_count(&self, name: &str) -> ThekeResult<u32> {
        let id = self.get_document_id(name)?;
        let count: i64 = self.conn.query_row(
            "SELECT sectionCount FROM documents WHERE id = ?1;",
            params![id],
            |row| row.get(0),
        )?;
        u32::try_from(count)
            .map_err(|_| ThekeError::CatalogIntegrity(format!("negative section count for `{name}`")))
    }

    pub fn get_document_names(&self, name: &str) -> ThekeResult<DocumentNames> {
        let id = self.get_document_id(name)?;
        let mut stmt = self.conn.prepare(
            "SELECT name, isShortName FROM documentNames \
             WHERE documentId = ?1 ORDER BY editionId ASC, name ASC;",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
        })?;

        let mut names = DocumentNames::default();
        for row in rows {
            let (name, is_short) = row?;
            if is_short {
                names.short_names.push(name);
            } else {
                names.names.push(name);
            }
        }
        Ok(names)
    }

    pub fn get_document_kind(&self, name: &str) -> ThekeResult<ContentKind> {
        let id = self.get_document_id(name)?;
        let kind: String = self.conn.query_row(
            "SELECT kind FROM documents WHERE id = ?1;",
            params![id],
            |row| row.get(0),
        )?;
        parse_content_kind(&kind)
    }

    pub fn get_document_testament(&self, name: &str) -> ThekeResult<Option<Testament>> {
        let id = self.get_document_id(name)?;
        let testament: Option<i64> = self.conn.query_row(
            "SELECT testament FROM documents WHERE id = ?1;",
            params![id],
            |row| row.get(0),
        )?;
        Ok(testament.and_then(Testament::from_i64))
    }

    /// Canonical names of every document of `kind`.
    pub fn list_documents_by_kind(&self, kind: ContentKind) -> ThekeResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT dn.name FROM documents d \
             JOIN documentNames dn ON dn.documentId = d.id AND dn.isShortName = 0 \
             JOIN editions e ON e.id = dn.editionId AND e.name = ?2 \
             WHERE d.kind = ?1 ORDER BY d.id ASC;",
        )?;
        let rows = stmt.query_map(params![kind.as_str(), DEFAULT_EDITION], |row| {
            row.get::<_, String>(0)
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_external_documents(&self) -> ThekeResult<Vec<ExternalDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT dn.name, s.name, COALESCE(s.uri, '') \
             FROM link_document_source l \
             JOIN sources s ON s.id = l.sourceId AND s.kind = ?1 \
             JOIN documentNames dn ON dn.documentId = l.documentId AND dn.isShortName = 0 \
             JOIN editions e ON e.id = dn.editionId AND e.name = ?2 \
             ORDER BY dn.name ASC;",
        )?;
        let rows = stmt.query_map(
            params![SourceKind::External.as_str(), DEFAULT_EDITION],
            |row| {
                Ok(ExternalDocument {
                    name: row.get(0)?,
                    source: row.get(1)?,
                    uri: row.get(2)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -----------------------------------------------------------------------
    // On-demand registration
    // -----------------------------------------------------------------------

    pub fn register_edition(&self, name: &str, short_name: &str, lang: &str) -> ThekeResult<i64> {
        ensure_edition(&self.conn, name, short_name, lang)
    }

    pub fn add_document_name(
        &self,
        document_id: i64,
        edition_id: i64,
        name: &str,
        is_short: bool,
    ) -> ThekeResult<()> {
        insert_document_name(&self.conn, document_id, edition_id, name, is_short)
    }

    /// Catalogue a document under the default edition and link it to an
    /// existing source. Re-registering the same name reuses the document.
    pub fn register_document(
        &self,
        name: &str,
        short_name: Option<&str>,
        kind: ContentKind,
        source: &str,
        section_count: u32,
    ) -> ThekeResult<i64> {
        self.transaction(|conn| {
            let source_id = source_id(conn, source)?
                .ok_or_else(|| ThekeError::NotFound(format!("source `{source}`")))?;
            let edition_id = default_edition(conn)?;
            let document_id = ensure_document(conn, edition_id, name, kind, section_count, None)?;
            if let Some(short) = short_name {
                insert_document_name(conn, document_id, edition_id, short, true)?;
            }
            link_document_source(conn, document_id, source_id)?;
            debug!(document = name, source, "document registered");
            Ok(document_id)
        })
    }
}

fn parse_content_kind(raw: &str) -> ThekeResult<ContentKind> {
    ContentKind::parse(raw)
        .ok_or_else(|| ThekeError::CatalogIntegrity(format!("unknown content kind `{raw}`")))
}

// ─── Write helpers ──────────────────────────────────────────────────────────
//
// Take a bare `&Connection` so callers can run them inside a transaction.

/// Insert a source, or on name conflict update its version only.
pub fn upsert_source(conn: &Connection, source: &NewSource<'_>) -> ThekeResult<i64> {
    conn.execute(
        "INSERT INTO sources(name, kind, contentKind, version, lang, uri) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(name) DO UPDATE SET version = excluded.version;",
        params![
            source.name,
            source.kind.as_str(),
            source.content_kind.as_str(),
            source.version,
            source.lang,
            source.uri,
        ],
    )?;
    let id = source_id(conn, source.name)?.ok_or_else(|| {
        ThekeError::CatalogIntegrity(format!("source `{}` vanished after upsert", source.name))
    })?;
    if !source.description.is_empty() {
        conn.execute(
            "INSERT INTO sourceDescriptions(sourceId, description, lang) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(sourceId, lang) DO UPDATE SET description = excluded.description;",
            params![id, source.description, source.lang],
        )?;
    }
    Ok(id)
}

pub fn source_id(conn: &Connection, name: &str) -> ThekeResult<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM sources WHERE name = ?1;",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?)
}

pub fn ensure_edition(conn: &Connection, name: &str, short_name: &str, lang: &str) -> ThekeResult<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO editions(name, shortName, lang) VALUES (?1, ?2, ?3);",
        params![name, short_name, lang],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM editions WHERE name = ?1;",
        params![name],
        |row| row.get::<_, i64>(0),
    )?)
}

pub fn default_edition(conn: &Connection) -> ThekeResult<i64> {
    ensure_edition(conn, DEFAULT_EDITION, DEFAULT_EDITION_SHORT, DEFAULT_LANG)
}

/// Id of the document named `name` in `edition_id`, creating it (with
/// `section_count`) the first time the name is seen. Existing documents are
/// left untouched.
pub fn ensure_document(
    conn: &Connection,
    edition_id: i64,
    name: &str,
    kind: ContentKind,
    section_count: u32,
    testament: Option<Testament>,
) -> ThekeResult<i64> {
    let existing = conn
        .query_row(
            "SELECT documentId FROM documentNames WHERE editionId = ?1 AND name = ?2;",
            params![edition_id, name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO documents(kind, sectionCount, testament) VALUES (?1, ?2, ?3);",
        params![kind.as_str(), section_count, testament.map(Testament::as_i64)],
    )?;
    let id = conn.last_insert_rowid();
    insert_document_name(conn, id, edition_id, name, false)?;
    Ok(id)
}

pub fn insert_document_name(
    conn: &Connection,
    document_id: i64,
    edition_id: i64,
    name: &str,
    is_short: bool,
) -> ThekeResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO documentNames(documentId, editionId, name, isShortName) \
         VALUES (?1, ?2, ?3, ?4);",
        params![document_id, edition_id, name, is_short],
    )?;
    Ok(())
}

pub fn set_document_description(
    conn: &Connection,
    document_id: i64,
    description: &str,
    lang: &str,
) -> ThekeResult<()> {
    conn.execute(
        "INSERT INTO documentDescriptions(documentId, description, lang) \
         VALUES (?1, ?2, ?3) \
         ON CONFLICT(documentId, lang) DO UPDATE SET description = excluded.description;",
        params![document_id, description, lang],
    )?;
    Ok(())
}

pub fn link_document_source(conn: &Connection, document_id: i64, source_id: i64) -> ThekeResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO link_document_source(documentId, sourceId) VALUES (?1, ?2);",
        params![document_id, source_id],
    )?;
    Ok(())
}
