//! Incremental catalog builder.
//!
//! Synchronises the catalog against the backend's module list. A module is
//! re-indexed only when its reported version is newer than the stored one
//! (or when forced). Book data for a module is gathered from the backend in
//! parallel, then written in a single transaction.

use std::cmp::Ordering;
use std::time::Instant;

use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::errors::{ThekeError, ThekeResult};
use crate::models::{BookIndex, ContentKind, ModuleInfo, SourceKind, SyncReport, Testament};
use crate::store::catalog::{
    default_edition, ensure_document, link_document_source, source_id, upsert_source, Catalog,
    NewSource,
};

/// A book a bible module carries, as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BookEntry {
    name: String,
    chapters: u32,
    testament: Testament,
}

fn parse_numeric_version(raw: &str) -> Option<Vec<u64>> {
    raw.trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Compare two version strings: dotted numeric when both are, lexical
/// otherwise. Missing numeric segments count as zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_numeric_version(a), parse_numeric_version(b)) {
        (Some(x), Some(y)) => {
            let len = x.len().max(y.len());
            for i in 0..len {
                let l = x.get(i).copied().unwrap_or(0);
                let r = y.get(i).copied().unwrap_or(0);
                match l.cmp(&r) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            Ordering::Equal
        }
        _ => a.trim().cmp(b.trim()),
    }
}

/// Whether a source reporting `version` has to be (re)indexed.
pub(crate) fn needs_reindex(
    catalog: &Catalog,
    name: &str,
    version: &str,
    force: bool,
) -> ThekeResult<bool> {
    if force || source_id(catalog.connection(), name)?.is_none() {
        return Ok(true);
    }
    let stored = catalog.get_source_version(name)?;
    Ok(compare_versions(version, &stored) == Ordering::Greater)
}

pub struct CatalogBuilder<'a> {
    catalog: &'a Catalog,
    backend: &'a dyn Backend,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(catalog: &'a Catalog, backend: &'a dyn Backend) -> Self {
        Self { catalog, backend }
    }

    /// Bring the catalog up to date with the backend's modules.
    ///
    /// A failing module is rolled back, logged and reported in
    /// [`SyncReport::failed`]; the remaining modules are still processed.
    pub fn sync(&self, force: bool) -> ThekeResult<SyncReport> {
        let start = Instant::now();
        let modules = self.backend.list_modules()?;
        let mut report = SyncReport::default();

        for module in &modules {
            let Some(content_kind) = ContentKind::parse(&module.content_kind) else {
                warn!(
                    module = %module.name,
                    content_kind = %module.content_kind,
                    "skipping module with unsupported content kind"
                );
                report.skipped.push(module.name.clone());
                continue;
            };

            match needs_reindex(self.catalog, &module.name, &module.version, force) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(module = %module.name, version = %module.version, "module up to date");
                    report.skipped.push(module.name.clone());
                    continue;
                }
                Err(e) => {
                    warn!(module = %module.name, error = %e, "cannot read stored module version");
                    report.failed.push(module.name.clone());
                    continue;
                }
            }

            match self.index_module(module, content_kind) {
                Ok(books) => {
                    info!(module = %module.name, version = %module.version, books, "module indexed");
                    report.indexed.push(module.name.clone());
                }
                Err(e) => {
                    let e = match e {
                        ThekeError::CatalogIntegrity(_) => e,
                        other => ThekeError::CatalogIntegrity(other.to_string()),
                    };
                    warn!(module = %module.name, error = %e, "module sync rolled back");
                    report.failed.push(module.name.clone());
                }
            }
        }

        info!(
            indexed = report.indexed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "catalog sync finished"
        );
        Ok(report)
    }

    /// Index one module; returns the number of books linked.
    fn index_module(&self, module: &ModuleInfo, content_kind: ContentKind) -> ThekeResult<usize> {
        let books = match content_kind {
            ContentKind::Bible => self.collect_books(&module.name)?,
            ContentKind::Book => Vec::new(),
        };

        self.catalog.transaction(|conn| {
            let source = NewSource {
                name: &module.name,
                kind: SourceKind::ExternalModule,
                content_kind,
                version: &module.version,
                lang: &module.lang,
                uri: None,
                description: &module.description,
            };
            let source_id = upsert_source(conn, &source)?;
            write_books(conn, source_id, &books)?;
            Ok(books.len())
        })
    }

    /// Query the backend for every book of both testaments the module has.
    fn collect_books(&self, module: &str) -> ThekeResult<Vec<BookEntry>> {
        let backend = self.backend;
        let indices: Vec<BookIndex> = Testament::ALL
            .iter()
            .flat_map(|&testament| {
                (1..=backend.book_count(testament)).map(move |i| BookIndex::new(testament, i))
            })
            .collect();

        let entries: Vec<ThekeResult<Option<BookEntry>>> = indices
            .par_iter()
            .map(|&book| {
                if !backend.has_entry(module, book) {
                    return Ok(None);
                }
                Ok(Some(BookEntry {
                    name: backend.canonical_book_name(module, book)?,
                    chapters: backend.chapter_count(module, book)?,
                    testament: book.testament,
                }))
            })
            .collect();

        let mut books = Vec::new();
        for entry in entries {
            if let Some(book) = entry? {
                books.push(book);
            }
        }
        Ok(books)
    }
}

fn write_books(conn: &Connection, source_id: i64, books: &[BookEntry]) -> ThekeResult<()> {
    if books.is_empty() {
        return Ok(());
    }
    let edition_id = default_edition(conn)?;
    for book in books {
        if book.name.trim().is_empty() {
            return Err(ThekeError::CatalogIntegrity(
                "backend reported an empty book name".into(),
            ));
        }
        let document_id = ensure_document(
            conn,
            edition_id,
            &book.name,
            ContentKind::Bible,
            book.chapters,
            Some(book.testament),
        )?;
        link_document_source(conn, document_id, source_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBackend;
    use test_log::test;

    fn table_counts(catalog: &Catalog) -> (i64, i64, i64, i64) {
        let conn = catalog.connection();
        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |r| r.get(0))
                .unwrap()
        };
        (
            count("sources"),
            count("documents"),
            count("documentNames"),
            count("link_document_source"),
        )
    }

    #[test]
    fn version_ordering() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1"), Ordering::Equal);
        assert_eq!(compare_versions("0", "2.1"), Ordering::Less);
        assert_eq!(compare_versions("b", "a"), Ordering::Greater);
    }

    #[test]
    fn first_sync_indexes_bibles_and_books() {
        let catalog = Catalog::open_in_memory().unwrap();
        let backend = FakeBackend::standard();
        let report = CatalogBuilder::new(&catalog, &backend).sync(false).unwrap();

        assert_eq!(report.indexed, vec!["FreCrampon", "MorphGNT", "OSHB", "Amoris"]);
        assert_eq!(report.skipped, vec!["StrongsGreek"]);
        assert!(report.failed.is_empty());

        assert_eq!(catalog.get_document_section_count("Genesis").unwrap(), 50);
        assert_eq!(
            catalog.list_document_sources("John").unwrap(),
            vec!["FreCrampon", "MorphGNT"]
        );
        assert_eq!(
            catalog.list_document_sources("Genesis").unwrap(),
            vec!["FreCrampon", "OSHB"]
        );
        assert_eq!(catalog.get_document_testament("John").unwrap(), Some(Testament::New));
        assert_eq!(catalog.get_source_version("Amoris").unwrap(), "1.0");
        assert!(catalog.list_documents_by_kind(ContentKind::Book).unwrap().is_empty());
    }

    #[test]
    fn second_sync_is_a_noop() {
        let catalog = Catalog::open_in_memory().unwrap();
        let backend = FakeBackend::standard();
        let builder = CatalogBuilder::new(&catalog, &backend);
        builder.sync(false).unwrap();
        let before = table_counts(&catalog);
        let documents = catalog.list_documents().unwrap();

        let report = builder.sync(false).unwrap();
        assert!(report.indexed.is_empty());
        assert!(report.is_noop());
        assert_eq!(table_counts(&catalog), before);
        assert_eq!(catalog.list_documents().unwrap(), documents);
    }

    #[test]
    fn version_gate_and_force() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut backend = FakeBackend::standard();
        CatalogBuilder::new(&catalog, &backend).sync(false).unwrap();

        backend.set_version("MorphGNT", "0.9");
        let report = CatalogBuilder::new(&catalog, &backend).sync(false).unwrap();
        assert!(!report.indexed.contains(&"MorphGNT".to_string()));
        assert_eq!(catalog.get_source_version("MorphGNT").unwrap(), "2.0");

        backend.set_version("MorphGNT", "2.10");
        let report = CatalogBuilder::new(&catalog, &backend).sync(false).unwrap();
        assert_eq!(report.indexed, vec!["MorphGNT"]);
        assert_eq!(catalog.get_source_version("MorphGNT").unwrap(), "2.10");

        let before = table_counts(&catalog);
        let report = CatalogBuilder::new(&catalog, &backend).sync(true).unwrap();
        assert_eq!(report.indexed.len(), 4);
        assert_eq!(table_counts(&catalog), before);
    }

    #[test]
    fn failing_module_is_rolled_back_and_others_continue() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut backend = FakeBackend::standard();
        backend.break_module("FreCrampon");

        let report = CatalogBuilder::new(&catalog, &backend).sync(false).unwrap();
        assert_eq!(report.failed, vec!["FreCrampon"]);
        assert_eq!(report.indexed, vec!["MorphGNT", "OSHB", "Amoris"]);
        assert_eq!(catalog.get_source_version("FreCrampon").unwrap(), "0");
        assert_eq!(catalog.list_document_sources("Genesis").unwrap(), vec!["OSHB"]);
        assert_eq!(catalog.list_document_sources("John").unwrap(), vec!["MorphGNT"]);
    }

    #[test]
    fn unreadable_stored_version_fails_only_that_module() {
        let catalog = Catalog::open_in_memory().unwrap();
        let backend = FakeBackend::standard();
        CatalogBuilder::new(&catalog, &backend).sync(false).unwrap();
        catalog
            .connection()
            .execute_batch("UPDATE sources SET version = X'00ff' WHERE name = 'MorphGNT';")
            .unwrap();
        assert!(catalog.get_source_version("MorphGNT").is_err());

        let report = CatalogBuilder::new(&catalog, &backend).sync(false).unwrap();
        assert_eq!(report.failed, vec!["MorphGNT"]);
        assert!(report.indexed.is_empty());
        assert!(report.skipped.contains(&"FreCrampon".to_string()));
        assert!(report.skipped.contains(&"Amoris".to_string()));
    }
}
