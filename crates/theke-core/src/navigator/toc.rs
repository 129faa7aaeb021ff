//! Tables of contents for bible books and book modules.

use serde::Serialize;

use crate::backend::TreeCursor;
use crate::uri::{Scheme, Uri, SEGM_BIBLE, SEGM_BOOK};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub label: String,
    #[serde(serialize_with = "serialize_uri")]
    pub uri: Uri,
}

fn serialize_uri<S: serde::Serializer>(uri: &Uri, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&uri.to_encoded_string())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableOfContents {
    pub document: String,
    pub entries: Vec<TocEntry>,
}

impl TableOfContents {
    /// One entry per chapter, `1..=chapters`.
    pub fn for_bible_book(book: &str, chapters: u32) -> Self {
        let entries = (1..=chapters)
            .map(|chapter| TocEntry {
                label: chapter.to_string(),
                uri: Uri::build(
                    Scheme::ExternalDoc,
                    [String::new(), SEGM_BIBLE.to_string(), format!("{book} {chapter}")],
                ),
            })
            .collect();
        Self {
            document: book.to_string(),
            entries,
        }
    }

    /// One entry per top-level section of a book module's tree.
    pub fn from_tree(module: &str, cursor: &mut dyn TreeCursor) -> Self {
        let mut entries = Vec::new();
        if cursor.first_child() {
            loop {
                let name = cursor.local_name();
                entries.push(TocEntry {
                    uri: Uri::build(Scheme::ExternalDoc, ["", SEGM_BOOK, module, name.as_str()]),
                    label: name,
                });
                if !cursor.next_sibling() {
                    break;
                }
            }
            cursor.parent();
        }
        Self {
            document: module.to_string(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
