//! Shared typed models used across the catalog, the indexer and the navigator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ThekeError;

// ---------------------------------------------------------------------------
// Catalog constants
// ---------------------------------------------------------------------------

/// Version reported for a source that has never been indexed.
pub const VERSION_NEVER_INDEXED: &str = "0";

/// Edition under which canonical book names are registered.
pub const DEFAULT_EDITION: &str = "canonical";
pub const DEFAULT_EDITION_SHORT: &str = "can";
pub const DEFAULT_LANG: &str = "en";

// ---------------------------------------------------------------------------
// 1. Kinds
// ---------------------------------------------------------------------------

/// Where a source comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A module served by the external backend.
    ExternalModule,
    /// A document fetched through the external cache.
    External,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::ExternalModule => "external-module",
            SourceKind::External => "external",
        }
    }
}

impl FromStr for SourceKind {
    type Err = ThekeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "external-module" => Ok(SourceKind::ExternalModule),
            "external" => Ok(SourceKind::External),
            other => Err(ThekeError::CatalogIntegrity(format!(
                "unknown source kind `{other}`"
            ))),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a source (and the documents it backs) contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Bible,
    Book,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Bible => "bible",
            ContentKind::Book => "book",
        }
    }

    /// `None` for content kinds this crate does not know how to catalogue.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bible" => Some(ContentKind::Bible),
            "book" => Some(ContentKind::Book),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two book ranges of a bible module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Testament {
    Old = 1,
    New = 2,
}

impl Testament {
    pub const ALL: [Testament; 2] = [Testament::Old, Testament::New];

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Testament::Old),
            2 => Some(Testament::New),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Backend records
// ---------------------------------------------------------------------------

/// A module as listed by the external backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    /// Raw content kind reported by the backend (`bible`, `book`, ...).
    pub content_kind: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub lang: String,
}

/// 1-based position of a book inside a testament.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BookIndex {
    pub testament: Testament,
    pub index: u32,
}

impl BookIndex {
    pub fn new(testament: Testament, index: u32) -> Self {
        Self { testament, index }
    }
}

// ---------------------------------------------------------------------------
// 3. Catalog records
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub name: String,
    pub kind: SourceKind,
    pub content_kind: ContentKind,
    pub description: String,
    pub version: String,
    pub lang: String,
    pub uri: Option<String>,
}

/// A `(canonical name, source name)` pair from the link table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentSource {
    pub document: String,
    pub source: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DocumentNames {
    pub names: Vec<String>,
    pub short_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExternalDocument {
    pub name: String,
    pub source: String,
    pub uri: String,
}

/// Outcome of one catalog synchronisation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub indexed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.indexed.is_empty() && self.failed.is_empty()
    }
}
