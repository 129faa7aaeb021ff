//! Stateful router from URIs to render-ready content.
//!
//! The [`Navigator`] owns the catalog connection and the navigation context.
//! It is driven from a single owner thread: `goto_*` calls resolve what they
//! can synchronously, and hand slow work (external document fetches,
//! searches) to the rayon pool. Completions come back over a channel and are
//! applied by [`Navigator::poll`]; each navigation bumps a generation counter
//! so only the most recent request can change the context.

pub mod cache;
pub mod events;
pub mod paragraph;
pub mod toc;

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{Backend, ExternalCache};
use crate::config::{render_cache_enabled, BiblicalSources, Settings};
use crate::errors::{ThekeError, ThekeResult};
use crate::indexer::builder::CatalogBuilder;
use crate::indexer::external::sync_external;
use crate::models::{ContentKind, SourceKind, SyncReport, Testament};
use crate::query::guards::DEFAULT_SEARCH_LIMIT;
use crate::query::search::{run_search, SearchResults};
use crate::reference::{BiblicalReference, Reference, ReferenceComparison, ReferenceResolver, INTERNAL_SOURCE};
use crate::store::catalog::Catalog;
use crate::uri::{Comparison, Scheme, Uri, PARAM_SOURCE, SEGM_APP, SEGM_ASSETS, SEGM_BIBLE, SEGM_BOOK};

use self::cache::RenderCache;
use self::events::{EventBus, NavigationEvent, NavigatorState, SubscriptionId, UpdateKind};
use self::toc::TableOfContents;

// ---------------------------------------------------------------------------
// Context and content
// ---------------------------------------------------------------------------

/// What the UI shows about the current location.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NavigationContext {
    #[serde(serialize_with = "serialize_opt_uri")]
    pub uri: Option<Uri>,
    pub reference: Option<Reference>,
    pub title: String,
    pub short_title: String,
    pub toc: Option<TableOfContents>,
    /// Canonical name of the document on display.
    pub document: Option<String>,
    pub sources: Vec<String>,
    pub available_sources: Vec<String>,
}

fn serialize_opt_uri<S: serde::Serializer>(uri: &Option<Uri>, serializer: S) -> Result<S::Ok, S::Error> {
    match uri {
        Some(uri) => serializer.serialize_some(&uri.to_encoded_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedSection {
    pub source: String,
    pub markup: String,
}

/// Render-ready content for the current location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Content {
    pub sections: Vec<RenderedSection>,
    /// Set when the target was missing and a placeholder is shown instead.
    pub not_found: bool,
}

impl Content {
    fn single(source: &str, markup: String) -> Self {
        Self {
            sections: vec![RenderedSection {
                source: source.to_string(),
                markup,
            }],
            not_found: false,
        }
    }

    fn not_found(what: &str) -> Self {
        Self {
            sections: vec![RenderedSection {
                source: String::new(),
                markup: format!("Not found: {what}"),
            }],
            not_found: true,
        }
    }
}

/// Result of a `goto_*` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GotoOutcome {
    Done(UpdateKind),
    /// The content is being fetched; the context changes on a later `poll`.
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SearchTicket(u64);

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

enum TocUpdate {
    Keep,
    Replace(Option<TableOfContents>),
}

/// A resolved navigation, ready to replace the context in one step.
struct Resolution {
    uri: Uri,
    reference: Option<Reference>,
    title: String,
    short_title: String,
    document: Option<String>,
    toc: TocUpdate,
    sources: Vec<String>,
    available_sources: Vec<String>,
    /// `None` keeps the content currently on display.
    content: Option<Content>,
    kind: UpdateKind,
}

enum Step {
    Ready(Resolution),
    Fetch {
        resolution: Resolution,
        name: String,
        uri: String,
    },
}

struct PendingLoad {
    generation: u64,
    resolution: Resolution,
}

enum Completion {
    Document {
        generation: u64,
        markup: ThekeResult<String>,
    },
    Search {
        ticket: SearchTicket,
        results: ThekeResult<SearchResults>,
    },
}

fn screen_title(name: &str) -> String {
    match name {
        "welcome" => "Welcome".to_string(),
        "modules" => "Modules".to_string(),
        "external_documents" => "External documents".to_string(),
        other => other.to_string(),
    }
}

/// Join `segments` under `root`, refusing anything that would escape it.
fn safe_join(root: &Path, segments: &[String]) -> ThekeResult<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in segments {
        for component in Path::new(segment).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(ThekeError::MalformedUri(format!(
                        "asset path escapes the assets directory: `{segment}`"
                    )))
                }
            }
        }
    }
    Ok(path)
}

fn read_asset(path: &Path) -> ThekeResult<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ThekeError::NotFound(format!(
            "asset {}",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Navigator
// ---------------------------------------------------------------------------

pub struct Navigator {
    settings: Settings,
    catalog: Catalog,
    backend: Arc<dyn Backend>,
    external: Arc<dyn ExternalCache>,
    resolver: ReferenceResolver,
    biblical_defaults: BiblicalSources,
    render_cache: RenderCache,
    events: EventBus,

    state: NavigatorState,
    context: NavigationContext,
    content: Option<Content>,
    last_uri: Option<Uri>,

    generation: u64,
    pending: Option<PendingLoad>,
    next_ticket: u64,
    active_search: Option<SearchTicket>,

    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl Navigator {
    pub fn new(
        settings: Settings,
        catalog: Catalog,
        backend: Arc<dyn Backend>,
        external: Arc<dyn ExternalCache>,
    ) -> Self {
        let render_cache = if render_cache_enabled() {
            RenderCache::new(
                settings.render_cache.max_entries,
                Duration::from_secs(settings.render_cache.ttl_seconds),
            )
        } else {
            RenderCache::disabled()
        };
        let (tx, rx) = mpsc::channel();
        Self {
            resolver: ReferenceResolver::new(settings.default_source.clone()),
            biblical_defaults: settings.default_biblical_sources.clone(),
            settings,
            catalog,
            backend,
            external,
            render_cache,
            events: EventBus::new(),
            state: NavigatorState::Idle,
            context: NavigationContext::default(),
            content: None,
            last_uri: None,
            generation: 0,
            pending: None,
            next_ticket: 0,
            active_search: None,
            tx,
            rx,
        }
    }

    /// Open the catalog at `settings.index_path` and build a navigator on it.
    pub fn open(
        settings: Settings,
        backend: Arc<dyn Backend>,
        external: Arc<dyn ExternalCache>,
    ) -> ThekeResult<Self> {
        let catalog = Catalog::open(&settings.index_path)?;
        Ok(Self::new(settings, catalog, backend, external))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> NavigatorState {
        self.state
    }

    pub fn context(&self) -> &NavigationContext {
        &self.context
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn render_cache(&self) -> &RenderCache {
        &self.render_cache
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&NavigationEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Synchronise the catalog with the backend modules and the external
    /// definitions directory.
    pub fn sync_catalog(&self, force: bool) -> ThekeResult<SyncReport> {
        let mut report = CatalogBuilder::new(&self.catalog, self.backend.as_ref()).sync(force)?;
        let external = sync_external(&self.catalog, &self.settings.external_sources_dir, force)?;
        report.indexed.extend(external.indexed);
        report.skipped.extend(external.skipped);
        report.failed.extend(external.failed);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Parse `raw` and navigate to it. A malformed URI never changes state.
    pub fn goto(&mut self, raw: &str) -> ThekeResult<GotoOutcome> {
        let uri = Uri::parse(raw)?;
        self.goto_uri(uri)
    }

    pub fn goto_welcome(&mut self) -> ThekeResult<GotoOutcome> {
        let welcome = self.settings.welcome_uri.clone();
        self.goto(&welcome)
    }

    pub fn goto_reference(&mut self, reference: &Reference) -> ThekeResult<GotoOutcome> {
        let uri = self.resolver.to_uri(reference);
        self.goto_uri(uri)
    }

    pub fn goto_uri(&mut self, uri: Uri) -> ThekeResult<GotoOutcome> {
        self.navigate(uri, false)
    }

    /// Re-issue the last successful navigation, dropping cached renders.
    pub fn reload(&mut self) -> ThekeResult<GotoOutcome> {
        self.render_cache.clear();
        match self.last_uri.clone() {
            Some(uri) => self.navigate(uri, true),
            None => Ok(GotoOutcome::Done(UpdateKind::Unchanged)),
        }
    }

    pub fn next_chapter(&mut self) -> ThekeResult<GotoOutcome> {
        self.step_chapter(1)
    }

    pub fn previous_chapter(&mut self) -> ThekeResult<GotoOutcome> {
        self.step_chapter(-1)
    }

    fn step_chapter(&mut self, delta: i64) -> ThekeResult<GotoOutcome> {
        let (Some(reference), Some(document)) = (
            self.context.reference.as_ref().and_then(Reference::as_biblical),
            self.context.document.as_deref(),
        ) else {
            debug!("chapter step ignored: no biblical reference");
            return Ok(GotoOutcome::Done(UpdateKind::Unchanged));
        };

        let count = i64::from(self.catalog.get_document_section_count(document)?);
        let target = i64::from(reference.chapter()) + delta;
        if target < 1 || target > count {
            debug!(chapter = target, count, "chapter step out of bounds");
            return Ok(GotoOutcome::Done(UpdateKind::Unchanged));
        }

        let next = Reference::from(reference.with_chapter(target as u32)?);
        let uri = self.resolver.to_uri(&next).with_sources(&self.context.sources);
        self.goto_uri(uri)
    }

    /// Add a source to the current biblical selection.
    pub fn add_source(&mut self, source: &str) -> ThekeResult<GotoOutcome> {
        if self.context.sources.iter().any(|s| s == source)
            || !self.context.available_sources.iter().any(|s| s == source)
        {
            return Ok(GotoOutcome::Done(UpdateKind::Unchanged));
        }
        let mut selection = self.context.sources.clone();
        selection.push(source.to_string());
        self.apply_selection(selection)
    }

    /// Remove a source from the current biblical selection. The last source
    /// cannot be removed.
    pub fn remove_source(&mut self, source: &str) -> ThekeResult<GotoOutcome> {
        if self.context.sources.len() <= 1 || !self.context.sources.iter().any(|s| s == source) {
            return Ok(GotoOutcome::Done(UpdateKind::Unchanged));
        }
        let selection: Vec<String> = self
            .context
            .sources
            .iter()
            .filter(|s| *s != source)
            .cloned()
            .collect();
        self.apply_selection(selection)
    }

    fn apply_selection(&mut self, selection: Vec<String>) -> ThekeResult<GotoOutcome> {
        let (Some(uri), Some(document)) = (self.context.uri.clone(), self.context.document.clone())
        else {
            return Ok(GotoOutcome::Done(UpdateKind::Unchanged));
        };
        if self.context.reference.as_ref().and_then(Reference::as_biblical).is_none() {
            return Ok(GotoOutcome::Done(UpdateKind::Unchanged));
        }

        match self.catalog.get_document_testament(&document)? {
            Some(Testament::Old) => self.biblical_defaults.ot = selection.clone(),
            Some(Testament::New) => self.biblical_defaults.nt = selection.clone(),
            None => {}
        }
        self.goto_uri(uri.with_sources(&selection))
    }

    fn navigate(&mut self, uri: Uri, force: bool) -> ThekeResult<GotoOutcome> {
        // Shortcuts only apply to a settled context: a pending load or an
        // error state must be replaced by a fresh navigation.
        let settled = self.state == NavigatorState::Loaded && self.pending.is_none();
        if !force && settled {
            if let Some(current) = &self.context.uri {
                let mask = current.compare(&uri);
                if mask == Comparison::SAME_URI {
                    return Ok(GotoOutcome::Done(UpdateKind::Unchanged));
                }
                if mask == Comparison::DIFFER_BY_FRAGMENT {
                    return Ok(self.change_section(uri));
                }
            }
        }

        self.generation += 1;
        self.pending = None;
        self.set_state(NavigatorState::Loading);
        debug!(uri = %uri, generation = self.generation, "navigating");

        match self.resolve(&uri, force) {
            Ok(Step::Ready(resolution)) => Ok(GotoOutcome::Done(self.apply(resolution))),
            Ok(Step::Fetch {
                resolution,
                name,
                uri: remote,
            }) => {
                self.spawn_fetch(resolution, name, remote);
                Ok(GotoOutcome::Pending)
            }
            Err(e) if e.is_not_found() => {
                info!(uri = %uri, error = %e, "showing not-found placeholder");
                let resolution = Resolution {
                    title: "Not found".to_string(),
                    short_title: "Not found".to_string(),
                    reference: None,
                    document: None,
                    toc: TocUpdate::Replace(None),
                    sources: Vec::new(),
                    available_sources: Vec::new(),
                    content: Some(Content::not_found(&uri.to_decoded_string())),
                    kind: UpdateKind::NewDocument,
                    uri,
                };
                Ok(GotoOutcome::Done(self.apply(resolution)))
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn change_section(&mut self, uri: Uri) -> GotoOutcome {
        debug!(fragment = uri.fragment(), "same document, new section");
        self.context.uri = Some(uri.clone());
        self.last_uri = Some(uri);
        self.emit(NavigationEvent::ContextUpdated {
            kind: UpdateKind::NewSection,
        });
        GotoOutcome::Done(UpdateKind::NewSection)
    }

    fn resolve(&self, uri: &Uri, force: bool) -> ThekeResult<Step> {
        match uri.scheme() {
            Scheme::Internal => self.resolve_internal(uri).map(Step::Ready),
            Scheme::ExternalDoc => match uri.segment(1) {
                Some(SEGM_BIBLE) => self.resolve_bible(uri, force).map(Step::Ready),
                Some(SEGM_BOOK) => self.resolve_book(uri),
                other => Err(ThekeError::UnsupportedKind(format!(
                    "unknown document kind `{}`",
                    other.unwrap_or_default()
                ))),
            },
            Scheme::Web => Err(ThekeError::UnsupportedScheme(format!(
                "`{uri}` is handled outside the navigator"
            ))),
        }
    }

    fn resolve_internal(&self, uri: &Uri) -> ThekeResult<Resolution> {
        if uri.segment(1) != Some(SEGM_APP) {
            return Err(ThekeError::UnsupportedKind(format!("unknown internal path in `{uri}`")));
        }
        let name = uri
            .segment(2)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ThekeError::MalformedUri(format!("`{uri}` names no screen")))?;

        let (path, title) = if name == SEGM_ASSETS {
            let rest = uri.path().get(3..).unwrap_or_default();
            let path = safe_join(&self.settings.assets_dir, rest)?;
            (path, rest.join("/"))
        } else {
            let path = safe_join(&self.settings.assets_dir, &[format!("{name}.html")])?;
            (path, screen_title(name))
        };
        let markup = read_asset(&path)?;

        Ok(Resolution {
            uri: uri.clone(),
            reference: Some(Reference::parse(name, Some(INTERNAL_SOURCE), &[])),
            short_title: title.clone(),
            title,
            document: None,
            toc: TocUpdate::Replace(None),
            sources: Vec::new(),
            available_sources: Vec::new(),
            content: Some(Content::single(INTERNAL_SOURCE, markup)),
            kind: UpdateKind::NewDocument,
        })
    }

    /// Pick the sources to display a document from.
    fn select_sources(&self, uri: &Uri, available: &[String], testament: Option<Testament>) -> Vec<String> {
        let keep = |names: Vec<String>| -> Vec<String> {
            let mut out: Vec<String> = Vec::new();
            for name in names {
                if available.contains(&name) && !out.contains(&name) {
                    out.push(name);
                }
            }
            out
        };

        let requested = keep(uri.sources());
        if !requested.is_empty() {
            return requested;
        }
        if let Some(source) = uri.param(PARAM_SOURCE) {
            let single = keep(vec![source.to_string()]);
            if !single.is_empty() {
                return single;
            }
        }
        let defaults = match testament {
            Some(Testament::Old) => keep(self.biblical_defaults.ot.clone()),
            Some(Testament::New) => keep(self.biblical_defaults.nt.clone()),
            None => Vec::new(),
        };
        if !defaults.is_empty() {
            return defaults;
        }
        available.iter().take(1).cloned().collect()
    }

    fn resolve_bible(&self, uri: &Uri, force: bool) -> ThekeResult<Resolution> {
        let parsed = self.resolver.from_uri(uri)?;
        let (label, chapter, verse) = match &parsed {
            Reference::Biblical(r) => (r.book().to_string(), r.chapter(), r.verse()),
            Reference::Generic(r) => (r.label.clone(), 1, 0),
        };

        let names = self.catalog.get_document_names(&label)?;
        let document = names.names.first().cloned().unwrap_or(label);
        let section_count = self.catalog.get_document_section_count(&document)?;
        if chapter > section_count {
            return Err(ThekeError::NotFound(format!("{document} {chapter}")));
        }

        let available = self.catalog.list_document_sources(&document)?;
        let testament = self.catalog.get_document_testament(&document)?;
        let sources = self.select_sources(uri, &available, testament);
        let Some(primary) = sources.first().cloned() else {
            return Err(ThekeError::ExternalSourceInaccessible(format!(
                "no source carries `{document}`"
            )));
        };

        let reference = BiblicalReference::new(document.clone(), chapter, verse)?.with_source(Some(primary));
        let same_document = self.context.document.as_deref() == Some(document.as_str());
        let previous = self.context.reference.as_ref();
        let same_chapter = same_document
            && previous.is_some_and(|p| {
                p.compare(&Reference::Biblical(reference.clone()))
                    .contains(ReferenceComparison::DIFFER_BY_VERSE)
            });

        let kind = if force {
            UpdateKind::NewDocument
        } else if same_chapter && sources == self.context.sources {
            UpdateKind::NewVerse
        } else if same_chapter {
            UpdateKind::SourcesUpdated
        } else {
            UpdateKind::NewDocument
        };

        let content = if kind == UpdateKind::NewVerse && self.content.is_some() {
            None
        } else {
            Some(self.render_chapters(&sources, &document, chapter)?)
        };

        let toc = if same_document && !force {
            TocUpdate::Keep
        } else {
            TocUpdate::Replace(Some(TableOfContents::for_bible_book(&document, section_count)))
        };

        Ok(Resolution {
            uri: uri.clone(),
            title: reference.full_repr(),
            short_title: reference.short_repr(),
            reference: Some(Reference::Biblical(reference)),
            document: Some(document),
            toc,
            sources,
            available_sources: available,
            content,
            kind,
        })
    }

    fn render_chapters(&self, sources: &[String], document: &str, chapter: u32) -> ThekeResult<Content> {
        let mut sections = Vec::with_capacity(sources.len());
        for source in sources {
            let chapter_label = chapter.to_string();
            let key = RenderCache::key(&["bible", source.as_str(), document, chapter_label.as_str()]);
            let (markup, mode) = self
                .render_cache
                .get_or_compute(&key, || self.backend.render_chapter(source, document, chapter))?;
            debug!(source = %source, document, chapter, ?mode, "chapter rendered");
            sections.push(RenderedSection {
                source: source.clone(),
                markup,
            });
        }
        Ok(Content {
            sections,
            not_found: false,
        })
    }

    fn resolve_book(&self, uri: &Uri) -> ThekeResult<Step> {
        let name = uri
            .segment(2)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ThekeError::MalformedUri(format!("`{uri}` names no book")))?;

        let source = match self.catalog.get_source(name)? {
            Some(source) => source,
            None => {
                let linked = match self.catalog.list_document_sources(name) {
                    Ok(linked) => linked,
                    Err(e) if e.is_not_found() => Vec::new(),
                    Err(e) => return Err(e),
                };
                let found = match linked.first() {
                    Some(first) => self.catalog.get_source(first)?,
                    None => None,
                };
                found.ok_or_else(|| {
                    ThekeError::ExternalSourceInaccessible(format!("unknown module `{name}`"))
                })?
            }
        };

        let same_document = self.context.document.as_deref() == Some(source.name.as_str());
        let title = if source.description.is_empty() {
            source.name.clone()
        } else {
            source.description.clone()
        };

        let mut resolution = Resolution {
            uri: uri.clone(),
            reference: Some(Reference::parse(&source.name, Some(source.name.as_str()), &[])),
            title,
            short_title: source.name.clone(),
            document: Some(source.name.clone()),
            toc: TocUpdate::Keep,
            sources: vec![source.name.clone()],
            available_sources: vec![source.name.clone()],
            content: None,
            kind: UpdateKind::NewDocument,
        };

        match source.kind {
            SourceKind::ExternalModule => {
                let section = uri
                    .segment(3)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(self.settings.default_book_section.as_str());
                let key = RenderCache::key(&["book", source.name.as_str(), section]);
                let (markup, _) = self
                    .render_cache
                    .get_or_compute(&key, || self.backend.render_paragraph(&source.name, section))?;

                if self.catalog.get_document_id(&source.name).is_err() {
                    self.catalog
                        .register_document(&source.name, None, ContentKind::Book, &source.name, 0)?;
                }
                if !same_document {
                    let mut cursor = self.backend.open_tree(&source.name)?;
                    resolution.toc = TocUpdate::Replace(Some(TableOfContents::from_tree(
                        &source.name,
                        cursor.as_mut(),
                    )));
                }
                resolution.content = Some(Content::single(&source.name, markup));
                Ok(Step::Ready(resolution))
            }
            SourceKind::External => {
                if !same_document {
                    resolution.toc = TocUpdate::Replace(None);
                }
                if self.external.is_cached(&source.name) {
                    let markup = self.external.load(&source.name)?;
                    resolution.content = Some(Content::single(&source.name, markup));
                    return Ok(Step::Ready(resolution));
                }
                let remote = source.uri.clone().ok_or_else(|| {
                    ThekeError::ExternalSourceInaccessible(format!(
                        "external source `{}` has no uri",
                        source.name
                    ))
                })?;
                Ok(Step::Fetch {
                    resolution,
                    name: source.name,
                    uri: remote,
                })
            }
        }
    }

    fn spawn_fetch(&mut self, resolution: Resolution, name: String, remote: String) {
        let generation = self.generation;
        self.pending = Some(PendingLoad {
            generation,
            resolution,
        });
        let external = Arc::clone(&self.external);
        let tx = self.tx.clone();
        info!(source = %name, uri = %remote, generation, "fetching external document");
        rayon::spawn(move || {
            let markup = if external.fetch(&name, &remote) {
                external.load(&name)
            } else {
                Err(ThekeError::ExternalSourceInaccessible(format!(
                    "could not fetch `{name}` from {remote}"
                )))
            };
            let _ = tx.send(Completion::Document { generation, markup });
        });
    }

    /// Replace the context with a resolution and report the change.
    fn apply(&mut self, resolution: Resolution) -> UpdateKind {
        let kind = resolution.kind;
        self.context.uri = Some(resolution.uri.clone());
        self.context.reference = resolution.reference;
        self.context.title = resolution.title;
        self.context.short_title = resolution.short_title;
        self.context.document = resolution.document;
        self.context.sources = resolution.sources;
        self.context.available_sources = resolution.available_sources;
        if let TocUpdate::Replace(toc) = resolution.toc {
            self.context.toc = toc;
        }
        if let Some(content) = resolution.content {
            self.content = Some(content);
        }
        self.last_uri = Some(resolution.uri);

        self.set_state(NavigatorState::Loaded);
        if kind != UpdateKind::Unchanged {
            self.emit(NavigationEvent::ContextUpdated { kind });
        }
        kind
    }

    fn fail(&mut self, error: &ThekeError) {
        warn!(error = %error, "navigation failed");
        self.set_state(NavigatorState::Error);
        self.emit(NavigationEvent::NavigationError {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn set_state(&mut self, state: NavigatorState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "navigator state");
            self.state = state;
            self.emit(NavigationEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: NavigationEvent) {
        self.events.emit(&event);
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Start a keyword search in the background. Results arrive through
    /// [`Navigator::poll`] as a `SearchFinished` event; starting another
    /// search or calling [`Navigator::cancel_search`] discards this one.
    pub fn search(&mut self, module: &str, keyword: &str) -> SearchTicket {
        self.next_ticket += 1;
        let ticket = SearchTicket(self.next_ticket);
        self.active_search = Some(ticket);

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let module = module.to_string();
        let keyword = keyword.to_string();
        debug!(module = %module, keyword = %keyword, ?ticket, "search started");
        rayon::spawn(move || {
            let results = run_search(backend.as_ref(), &module, &keyword, DEFAULT_SEARCH_LIMIT);
            let _ = tx.send(Completion::Search { ticket, results });
        });
        ticket
    }

    pub fn cancel_search(&mut self) {
        if let Some(ticket) = self.active_search.take() {
            debug!(?ticket, "search cancelled");
        }
    }

    pub fn is_searching(&self) -> bool {
        self.active_search.is_some()
    }

    // -----------------------------------------------------------------------
    // Completions
    // -----------------------------------------------------------------------

    /// Apply every completion that has already arrived. Returns how many
    /// were applied; stale ones are discarded and not counted.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.rx.try_recv() {
            if self.handle(completion) {
                applied += 1;
            }
        }
        applied
    }

    /// Like [`Navigator::poll`], but wait up to `timeout` for the first
    /// completion when none is ready.
    pub fn poll_timeout(&mut self, timeout: Duration) -> usize {
        let first = match self.rx.recv_timeout(timeout) {
            Ok(completion) => completion,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return 0,
        };
        let applied = usize::from(self.handle(first));
        applied + self.poll()
    }

    /// Whether a background load or search is still outstanding.
    pub fn has_pending_work(&self) -> bool {
        self.pending.is_some() || self.active_search.is_some()
    }

    fn handle(&mut self, completion: Completion) -> bool {
        match completion {
            Completion::Document { generation, markup } => {
                let is_current = self
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.generation == generation && generation == self.generation);
                if !is_current {
                    debug!(generation, current = self.generation, "discarding stale load");
                    return false;
                }
                let Some(pending) = self.pending.take() else {
                    return false;
                };
                match markup {
                    Ok(markup) => {
                        let mut resolution = pending.resolution;
                        let source = resolution.sources.first().cloned().unwrap_or_default();
                        resolution.content = Some(Content::single(&source, markup));
                        self.apply(resolution);
                    }
                    Err(e) => self.fail(&e),
                }
                true
            }
            Completion::Search { ticket, results } => {
                if self.active_search != Some(ticket) {
                    debug!(?ticket, "discarding stale search");
                    return false;
                }
                self.active_search = None;
                match results {
                    Ok(results) => self.emit(NavigationEvent::SearchFinished { results }),
                    Err(e) => {
                        warn!(error = %e, "search failed");
                        self.emit(NavigationEvent::NavigationError {
                            kind: e.kind(),
                            message: e.to_string(),
                        });
                    }
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests;
