//! Externally sourced documents.
//!
//! Each `<name>.json` file in the definitions directory describes one
//! document served from the web:
//!
//! ```json
//! { "name": "Amoris laetitia", "shortname": "AL", "version": "1",
//!   "lang": "fr", "uri": "https://…", "description": "…" }
//! ```
//!
//! Definitions are indexed like backend modules, version-gated, one
//! transaction per definition.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::ThekeResult;
use crate::indexer::builder::needs_reindex;
use crate::models::{ContentKind, SourceKind, SyncReport};
use crate::store::catalog::{
    default_edition, ensure_document, insert_document_name, link_document_source,
    set_document_description, upsert_source, Catalog, NewSource,
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ExternalDefinition {
    pub name: String,
    #[serde(default)]
    pub shortname: Option<String>,
    pub version: String,
    #[serde(default)]
    pub lang: String,
    pub uri: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn definition_files(dir: &Path) -> ThekeResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse every definition in `dir`. Unreadable or malformed files are
/// skipped with a warning; a missing directory yields nothing.
pub fn load_definitions(dir: &Path) -> ThekeResult<Vec<ExternalDefinition>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no external definitions directory");
        return Ok(Vec::new());
    }

    let mut definitions = Vec::new();
    for path in definition_files(dir)? {
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<ExternalDefinition>(&raw).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(definition) => definitions.push(definition),
            Err(error) => {
                warn!(file = %path.display(), %error, "skipping external definition");
            }
        }
    }
    Ok(definitions)
}

/// Index the definitions found in `dir` into the catalog.
pub fn sync_external(catalog: &Catalog, dir: &Path, force: bool) -> ThekeResult<SyncReport> {
    let mut report = SyncReport::default();

    for definition in load_definitions(dir)? {
        match needs_reindex(catalog, &definition.name, &definition.version, force) {
            Ok(true) => {}
            Ok(false) => {
                report.skipped.push(definition.name);
                continue;
            }
            Err(e) => {
                warn!(source = %definition.name, error = %e, "cannot read stored source version");
                report.failed.push(definition.name);
                continue;
            }
        }
        match index_definition(catalog, &definition) {
            Ok(()) => {
                info!(source = %definition.name, version = %definition.version, "external source indexed");
                report.indexed.push(definition.name);
            }
            Err(e) => {
                warn!(source = %definition.name, error = %e, "external source sync rolled back");
                report.failed.push(definition.name);
            }
        }
    }

    Ok(report)
}

fn index_definition(catalog: &Catalog, definition: &ExternalDefinition) -> ThekeResult<()> {
    let description = definition.description.as_deref().unwrap_or_default();
    catalog.transaction(|conn| {
        let source_id = upsert_source(
            conn,
            &NewSource {
                name: &definition.name,
                kind: SourceKind::External,
                content_kind: ContentKind::Book,
                version: &definition.version,
                lang: &definition.lang,
                uri: Some(&definition.uri),
                description,
            },
        )?;
        let edition_id = default_edition(conn)?;
        let document_id =
            ensure_document(conn, edition_id, &definition.name, ContentKind::Book, 0, None)?;
        if let Some(short) = definition.shortname.as_deref().filter(|s| !s.is_empty()) {
            insert_document_name(conn, document_id, edition_id, short, true)?;
        }
        if !description.is_empty() {
            set_document_description(conn, document_id, description, &definition.lang)?;
        }
        link_document_source(conn, document_id, source_id)?;
        Ok(())
    })
}
