//! Human-meaningful pointers to content, and their mapping to [`Uri`]s.
//!
//! A label such as `John 3:16` parses into a [`BiblicalReference`]; anything
//! the biblical grammar does not recognise stays a [`GenericReference`]
//! carrying the raw label. Parsing a label never fails.

use std::collections::BTreeSet;
use std::ops::BitOr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::errors::{ThekeError, ThekeResult};
use crate::uri::{Scheme, Uri, PARAM_SOURCE, SEGM_APP, SEGM_BIBLE};

/// Source name that routes a generic reference to an in-app screen.
pub const INTERNAL_SOURCE: &str = "internal";

static BIBLICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w\s]+) (\d+)(:(\d+))?$").unwrap());

// ---------------------------------------------------------------------------
// Comparison mask
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ReferenceComparison(u8);

impl ReferenceComparison {
    pub const NOTHING_IN_COMMON: Self = Self(0);
    pub const SAME_TYPE: Self = Self(1 << 0);
    pub const SAME_BOOK: Self = Self(1 << 1);
    pub const SAME_CHAPTER: Self = Self(1 << 2);
    pub const SAME_VERSE: Self = Self(1 << 3);

    pub const SAME_REFERENCE: Self = Self(0b1111);
    pub const DIFFER_BY_VERSE: Self = Self(0b0111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ReferenceComparison {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ---------------------------------------------------------------------------
// Reference variants
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GenericReference {
    pub label: String,
    pub source: Option<String>,
    pub tags: BTreeSet<String>,
}

/// `book chapter[:verse]`. A verse of 0 designates the whole chapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BiblicalReference {
    book: String,
    chapter: u32,
    verse: u32,
    source: Option<String>,
    tags: BTreeSet<String>,
}

impl BiblicalReference {
    pub fn new(book: impl Into<String>, chapter: u32, verse: u32) -> ThekeResult<Self> {
        let book = book.into();
        if book.trim().is_empty() {
            return Err(ThekeError::InvalidReference("empty book name".into()));
        }
        if chapter < 1 {
            return Err(ThekeError::InvalidReference(format!(
                "chapter must be >= 1 in `{book} {chapter}`"
            )));
        }
        Ok(Self {
            book,
            chapter,
            verse,
            source: None,
            tags: BTreeSet::new(),
        })
    }

    pub fn with_source(mut self, source: Option<impl Into<String>>) -> Self {
        self.source = source.map(Into::into);
        self
    }

    /// Chapter-level reference to another chapter of the same book,
    /// keeping the source selection.
    pub fn with_chapter(&self, chapter: u32) -> ThekeResult<Self> {
        Ok(Self::new(self.book.clone(), chapter, 0)?
            .with_source(self.source.clone())
            .with_tags(self.tags.iter().cloned()))
    }

    fn with_tags<I: IntoIterator<Item = String>>(mut self, tags: I) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn book(&self) -> &str {
        &self.book
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    pub fn verse(&self) -> u32 {
        self.verse
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn full_repr(&self) -> String {
        if self.verse == 0 {
            self.short_repr()
        } else {
            format!("{} {}:{}", self.book, self.chapter, self.verse)
        }
    }

    pub fn short_repr(&self) -> String {
        format!("{} {}", self.book, self.chapter)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reference {
    Generic(GenericReference),
    Biblical(BiblicalReference),
}

impl Reference {
    /// Parse a label against the biblical grammar, falling back to a
    /// generic reference that keeps the label untouched.
    pub fn parse(label: &str, source: Option<&str>, tags: &[&str]) -> Self {
        let tags: BTreeSet<String> = tags.iter().map(|t| t.to_string()).collect();
        let source = source.map(str::to_string);

        if let Some(caps) = BIBLICAL_RE.captures(label) {
            let chapter = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            let verse = match caps.get(4) {
                Some(m) => m.as_str().parse::<u32>().ok(),
                None => Some(0),
            };
            if let (Some(book), Some(chapter), Some(verse)) = (caps.get(1), chapter, verse) {
                if let Ok(reference) = BiblicalReference::new(book.as_str(), chapter, verse) {
                    return Reference::Biblical(
                        reference.with_source(source).with_tags(tags),
                    );
                }
            }
        }

        Reference::Generic(GenericReference {
            label: label.to_string(),
            source,
            tags,
        })
    }

    pub fn label(&self) -> String {
        match self {
            Reference::Generic(r) => r.label.clone(),
            Reference::Biblical(r) => r.full_repr(),
        }
    }

    pub fn short_label(&self) -> String {
        match self {
            Reference::Generic(r) => r.label.clone(),
            Reference::Biblical(r) => r.short_repr(),
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Reference::Generic(r) => r.source.as_deref(),
            Reference::Biblical(r) => r.source.as_deref(),
        }
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        match self {
            Reference::Generic(r) => &r.tags,
            Reference::Biblical(r) => &r.tags,
        }
    }

    pub fn as_biblical(&self) -> Option<&BiblicalReference> {
        match self {
            Reference::Biblical(r) => Some(r),
            Reference::Generic(_) => None,
        }
    }

    pub fn compare(&self, other: &Reference) -> ReferenceComparison {
        match (self, other) {
            (Reference::Biblical(a), Reference::Biblical(b)) => {
                let mut mask = ReferenceComparison::SAME_TYPE;
                if a.book == b.book {
                    mask = mask | ReferenceComparison::SAME_BOOK;
                    if a.chapter == b.chapter {
                        mask = mask | ReferenceComparison::SAME_CHAPTER;
                        if a.verse == b.verse {
                            mask = mask | ReferenceComparison::SAME_VERSE;
                        }
                    }
                }
                mask
            }
            (Reference::Generic(a), Reference::Generic(b)) => {
                if a.label == b.label {
                    ReferenceComparison::SAME_TYPE | ReferenceComparison::SAME_BOOK
                } else {
                    ReferenceComparison::SAME_TYPE
                }
            }
            _ => ReferenceComparison::NOTHING_IN_COMMON,
        }
    }
}

impl From<BiblicalReference> for Reference {
    fn from(value: BiblicalReference) -> Self {
        Reference::Biblical(value)
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Converts between references and URIs relative to a default source.
///
/// The default source is omitted from generated URIs and assumed when a URI
/// carries no `source` param, so `from_uri(to_uri(r))` keeps the source.
#[derive(Clone, Debug)]
pub struct ReferenceResolver {
    default_source: String,
}

impl ReferenceResolver {
    pub fn new(default_source: impl Into<String>) -> Self {
        Self {
            default_source: default_source.into(),
        }
    }

    pub fn default_source(&self) -> &str {
        &self.default_source
    }

    pub fn parse(&self, label: &str, source: Option<&str>, tags: &[&str]) -> Reference {
        Reference::parse(label, source, tags)
    }

    pub fn from_uri(&self, uri: &Uri) -> ThekeResult<Reference> {
        if uri.scheme() != Scheme::ExternalDoc {
            return Err(ThekeError::UnsupportedScheme(format!(
                "cannot build a reference from `{uri}`"
            )));
        }
        if uri.segment(1) != Some(SEGM_BIBLE) {
            return Err(ThekeError::UnsupportedKind(format!(
                "`{uri}` does not address a biblical document"
            )));
        }
        let label = uri.segment(2).ok_or_else(|| {
            ThekeError::MalformedUri(format!("`{uri}` has no reference label"))
        })?;
        let source = uri.param(PARAM_SOURCE).unwrap_or(&self.default_source);
        Ok(Reference::parse(label, Some(source), &[]))
    }

    pub fn to_uri(&self, reference: &Reference) -> Uri {
        if let Reference::Generic(r) = reference {
            if r.source.as_deref() == Some(INTERNAL_SOURCE) {
                return Uri::build(Scheme::Internal, ["", SEGM_APP, r.label.as_str()]);
            }
        }

        let uri = Uri::build(
            Scheme::ExternalDoc,
            [String::new(), SEGM_BIBLE.to_string(), reference.label()],
        );
        match reference.source() {
            Some(source) if source != self.default_source => uri.with_param(PARAM_SOURCE, source),
            _ => uri,
        }
    }
}
