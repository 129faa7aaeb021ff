//! Collaborators the core consumes but does not implement.
//!
//! The module engine that serves bibles and books sits behind [`Backend`];
//! book modules expose their section tree through a [`TreeCursor`]; documents
//! downloaded from the web sit behind [`ExternalCache`]. A single backend
//! handle is created at startup and shared as `Arc<dyn Backend>`.

use crate::errors::{ThekeError, ThekeResult};
use crate::models::{BookIndex, ModuleInfo, Testament};
use crate::navigator::paragraph::{find_section, SectionLookup};

/// The external module engine.
pub trait Backend: Send + Sync {
    fn list_modules(&self) -> ThekeResult<Vec<ModuleInfo>>;

    /// Number of books the versification defines for a testament.
    fn book_count(&self, testament: Testament) -> u32;

    fn has_entry(&self, module: &str, book: BookIndex) -> bool;

    fn chapter_count(&self, module: &str, book: BookIndex) -> ThekeResult<u32>;

    fn canonical_book_name(&self, module: &str, book: BookIndex) -> ThekeResult<String>;

    fn render_chapter(&self, module: &str, book: &str, chapter: u32) -> ThekeResult<String>;

    /// Cursor positioned on the root of a book module's section tree.
    fn open_tree(&self, module: &str) -> ThekeResult<Box<dyn TreeCursor + '_>>;

    /// Raw references (`Book c:v`) of every verse matching `keyword`.
    fn search(&self, module: &str, keyword: &str) -> ThekeResult<Vec<String>>;

    /// Text of the section `id` of a book module, or of the run of sections
    /// starting at `id` when it sits inside a numeric range.
    fn render_paragraph(&self, module: &str, id: &str) -> ThekeResult<String> {
        let mut cursor = self.open_tree(module)?;
        match find_section(cursor.as_mut(), id) {
            SectionLookup::Found(text) | SectionLookup::FoundWithSiblings(text) => Ok(text),
            SectionLookup::NotFound => Err(ThekeError::NotFound(format!(
                "section `{id}` in module `{module}`"
            ))),
        }
    }
}

/// Navigation over a section tree. Movement methods return `false` and
/// leave the cursor in place when the move is impossible.
pub trait TreeCursor {
    fn first_child(&mut self) -> bool;
    fn next_sibling(&mut self) -> bool;
    fn parent(&mut self) -> bool;
    fn local_name(&self) -> String;
    fn text(&self) -> String;
}

/// Local copies of externally sourced documents.
pub trait ExternalCache: Send + Sync {
    fn is_cached(&self, name: &str) -> bool;

    /// Download `uri` into the cache under `name`; `false` when the source
    /// could not be reached.
    fn fetch(&self, name: &str, uri: &str) -> bool;

    fn load(&self, name: &str) -> ThekeResult<String>;
}
