//! Keyword search over a bible module, grouped by book.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::backend::Backend;
use crate::errors::ThekeResult;
use crate::query::guards::{clamp_limit, truncate_query, MAX_SEARCH_LIMIT};
use crate::reference::Reference;

/// Matches of one search, keyed by book in the order the backend reported
/// them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub module: String,
    pub keyword: String,
    pub total: usize,
    pub truncated: bool,
    pub books: IndexMap<String, Vec<String>>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Group raw references (`Book c:v`) by book, keeping at most `limit`.
    pub fn group(module: &str, keyword: &str, raw: Vec<String>, limit: i64) -> Self {
        let limit = clamp_limit(limit, MAX_SEARCH_LIMIT) as usize;
        let truncated = raw.len() > limit;

        let mut books: IndexMap<String, Vec<String>> = IndexMap::new();
        for label in raw.into_iter().take(limit) {
            let book = match Reference::parse(&label, None, &[]) {
                Reference::Biblical(r) => r.book().to_string(),
                Reference::Generic(r) => r.label,
            };
            books.entry(book).or_default().push(label);
        }

        Self {
            module: module.to_string(),
            keyword: keyword.to_string(),
            total: books.values().map(Vec::len).sum(),
            truncated,
            books,
        }
    }
}

/// Run a keyword search against `module`. A blank keyword matches nothing
/// and does not reach the backend.
pub fn run_search(
    backend: &dyn Backend,
    module: &str,
    keyword: &str,
    limit: i64,
) -> ThekeResult<SearchResults> {
    let keyword = truncate_query(keyword);
    if keyword.is_empty() {
        return Ok(SearchResults {
            module: module.to_string(),
            ..SearchResults::default()
        });
    }
    let raw = backend.search(module, &keyword)?;
    let results = SearchResults::group(module, &keyword, raw, limit);
    debug!(module, keyword = %keyword, total = results.total, truncated = results.truncated, "search finished");
    Ok(results)
}
