//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{Backend, ExternalCache, TreeCursor};
use crate::errors::{ThekeError, ThekeResult};
use crate::models::{BookIndex, ModuleInfo, Testament};

// ---------------------------------------------------------------------------
// Section trees
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct FakeNode {
    name: String,
    text: String,
    children: Vec<FakeNode>,
}

impl FakeNode {
    pub fn leaf(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
            children: Vec::new(),
        }
    }

    pub fn branch(name: &str, children: Vec<FakeNode>) -> Self {
        Self {
            name: name.to_string(),
            text: String::new(),
            children,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FakeTree {
    roots: Vec<FakeNode>,
}

impl FakeTree {
    pub fn new(roots: Vec<FakeNode>) -> Self {
        Self { roots }
    }

    pub fn cursor(&self) -> FakeCursor<'_> {
        FakeCursor {
            roots: &self.roots,
            path: Vec::new(),
        }
    }
}

/// Cursor over a [`FakeTree`]; an empty path is the (nameless) root.
pub struct FakeCursor<'a> {
    roots: &'a [FakeNode],
    path: Vec<usize>,
}

impl<'a> FakeCursor<'a> {
    fn children_at(&self, depth: usize) -> &'a [FakeNode] {
        let mut children = self.roots;
        for &i in &self.path[..depth] {
            children = &children[i].children;
        }
        children
    }

    fn node(&self) -> Option<&'a FakeNode> {
        let (&last, _) = self.path.split_last()?;
        self.children_at(self.path.len() - 1).get(last)
    }
}

impl TreeCursor for FakeCursor<'_> {
    fn first_child(&mut self) -> bool {
        if self.children_at(self.path.len()).is_empty() {
            return false;
        }
        self.path.push(0);
        true
    }

    fn next_sibling(&mut self) -> bool {
        let Some(&last) = self.path.last() else {
            return false;
        };
        if last + 1 < self.children_at(self.path.len() - 1).len() {
            if let Some(slot) = self.path.last_mut() {
                *slot += 1;
            }
            return true;
        }
        false
    }

    fn parent(&mut self) -> bool {
        self.path.pop().is_some()
    }

    fn local_name(&self) -> String {
        self.node().map(|n| n.name.clone()).unwrap_or_default()
    }

    fn text(&self) -> String {
        self.node().map(|n| n.text.clone()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

struct FakeBook {
    index: BookIndex,
    name: &'static str,
    chapters: u32,
}

pub struct FakeBackend {
    modules: Vec<ModuleInfo>,
    books: Vec<FakeBook>,
    coverage: HashMap<String, Vec<Testament>>,
    trees: HashMap<String, FakeTree>,
    broken: HashSet<String>,
    hits: HashMap<String, Vec<String>>,
    search_calls: AtomicUsize,
    render_calls: AtomicUsize,
}

fn module(name: &str, content_kind: &str, version: &str, lang: &str, description: &str) -> ModuleInfo {
    ModuleInfo {
        name: name.to_string(),
        content_kind: content_kind.to_string(),
        description: description.to_string(),
        version: version.to_string(),
        lang: lang.to_string(),
    }
}

impl FakeBackend {
    /// Two bibles covering both testaments between them, a Hebrew Old
    /// Testament, one book module and one module of an unsupported kind.
    pub fn standard() -> Self {
        let modules = vec![
            module("FreCrampon", "bible", "1.0", "fr", "Bible Crampon 1923"),
            module("MorphGNT", "bible", "2.0", "grc", "Morphological Greek New Testament"),
            module("OSHB", "bible", "1.0", "hbo", "Open Scriptures Hebrew Bible"),
            module("Amoris", "book", "1.0", "fr", "Amoris laetitia"),
            module("StrongsGreek", "lexicon", "1.0", "en", "Strong's Greek dictionary"),
        ];
        let books = vec![
            FakeBook { index: BookIndex::new(Testament::Old, 1), name: "Genesis", chapters: 50 },
            FakeBook { index: BookIndex::new(Testament::Old, 2), name: "Exodus", chapters: 40 },
            FakeBook { index: BookIndex::new(Testament::New, 1), name: "John", chapters: 21 },
            FakeBook { index: BookIndex::new(Testament::New, 2), name: "Romans", chapters: 16 },
        ];
        let coverage = HashMap::from([
            ("FreCrampon".to_string(), vec![Testament::Old, Testament::New]),
            ("MorphGNT".to_string(), vec![Testament::New]),
            ("OSHB".to_string(), vec![Testament::Old]),
        ]);
        let trees = HashMap::from([(
            "Amoris".to_string(),
            FakeTree::new(vec![
                FakeNode::leaf("Couverture", "La joie de l'amour"),
                FakeNode::branch(
                    "1 to 3",
                    vec![
                        FakeNode::leaf("1", "Paragraphe 1"),
                        FakeNode::leaf("2", "Paragraphe 2"),
                        FakeNode::leaf("3", "Paragraphe 3"),
                    ],
                ),
                FakeNode::leaf("4", "Paragraphe 4"),
            ]),
        )]);
        let hits = HashMap::from([
            ("logos".to_string(), vec!["John 1:1".to_string()]),
            (
                "agape".to_string(),
                vec![
                    "John 3:16".to_string(),
                    "Romans 5:8".to_string(),
                    "John 15:13".to_string(),
                ],
            ),
        ]);

        Self {
            modules,
            books,
            coverage,
            trees,
            broken: HashSet::new(),
            hits,
            search_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_version(&mut self, name: &str, version: &str) {
        if let Some(m) = self.modules.iter_mut().find(|m| m.name == name) {
            m.version = version.to_string();
        }
    }

    /// Make every per-book query against `name` fail.
    pub fn break_module(&mut self, name: &str) {
        self.broken.insert(name.to_string());
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    fn known(&self, module: &str) -> ThekeResult<()> {
        if self.modules.iter().any(|m| m.name == module) {
            Ok(())
        } else {
            Err(ThekeError::Backend(format!("unknown module `{module}`")))
        }
    }

    fn book(&self, module: &str, index: BookIndex) -> ThekeResult<&FakeBook> {
        if self.broken.contains(module) {
            return Err(ThekeError::Backend(format!("module `{module}` is corrupted")));
        }
        self.books
            .iter()
            .find(|b| b.index == index)
            .ok_or_else(|| ThekeError::NotFound(format!("book {index:?}")))
    }
}

impl Backend for FakeBackend {
    fn list_modules(&self) -> ThekeResult<Vec<ModuleInfo>> {
        Ok(self.modules.clone())
    }

    fn book_count(&self, testament: Testament) -> u32 {
        self.books.iter().filter(|b| b.index.testament == testament).count() as u32
    }

    fn has_entry(&self, module: &str, book: BookIndex) -> bool {
        self.coverage
            .get(module)
            .is_some_and(|testaments| testaments.contains(&book.testament))
            && self.books.iter().any(|b| b.index == book)
    }

    fn chapter_count(&self, module: &str, book: BookIndex) -> ThekeResult<u32> {
        Ok(self.book(module, book)?.chapters)
    }

    fn canonical_book_name(&self, module: &str, book: BookIndex) -> ThekeResult<String> {
        Ok(self.book(module, book)?.name.to_string())
    }

    fn render_chapter(&self, module: &str, book: &str, chapter: u32) -> ThekeResult<String> {
        self.known(module)?;
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("<p>{module} {book} {chapter}</p>"))
    }

    fn open_tree(&self, module: &str) -> ThekeResult<Box<dyn TreeCursor + '_>> {
        self.known(module)?;
        let tree = self
            .trees
            .get(module)
            .ok_or_else(|| ThekeError::Backend(format!("module `{module}` has no section tree")))?;
        Ok(Box::new(tree.cursor()))
    }

    fn search(&self, module: &str, keyword: &str) -> ThekeResult<Vec<String>> {
        self.known(module)?;
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.get(keyword).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// External cache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeCache {
    cached: Mutex<HashMap<String, String>>,
    remote: HashMap<String, String>,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    fetch_calls: AtomicUsize,
}

impl FakeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` when `uri` is fetched.
    pub fn with_remote(mut self, uri: &str, content: &str) -> Self {
        self.remote.insert(uri.to_string(), content.to_string());
        self
    }

    /// Block the next fetch until the returned sender fires (or is dropped).
    pub fn gate(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl ExternalCache for FakeCache {
    fn is_cached(&self, name: &str) -> bool {
        self.cached.lock().contains_key(name)
    }

    fn fetch(&self, name: &str, uri: &str) -> bool {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some(rx) = gate {
            let _ = rx.recv_timeout(Duration::from_secs(5));
        }
        match self.remote.get(uri) {
            Some(content) => {
                self.cached.lock().insert(name.to_string(), content.clone());
                true
            }
            None => false,
        }
    }

    fn load(&self, name: &str) -> ThekeResult<String> {
        self.cached
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ThekeError::NotFound(format!("cached document `{name}`")))
    }
}
