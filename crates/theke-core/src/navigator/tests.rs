use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use test_log::test;

use super::*;
use crate::errors::ErrorKind;
use crate::test_support::{FakeBackend, FakeCache};

const WAIT: Duration = Duration::from_secs(5);
const LUMEN_URI: &str = "https://example.org/lumen.html";

struct Harness {
    nav: Navigator,
    backend: Arc<FakeBackend>,
    cache: Arc<FakeCache>,
    events: Arc<Mutex<Vec<NavigationEvent>>>,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_cache(FakeCache::new().with_remote(LUMEN_URI, "<p>Lumen</p>"))
    }

    fn with_cache(cache: FakeCache) -> Self {
        let dir = TempDir::new().unwrap();
        let assets = dir.path().join("assets");
        let external = dir.path().join("external");
        std::fs::create_dir_all(assets.join("css")).unwrap();
        std::fs::create_dir_all(&external).unwrap();
        std::fs::write(assets.join("welcome.html"), "<h1>Bienvenue</h1>").unwrap();
        std::fs::write(assets.join("css").join("theke.css"), "body {}").unwrap();
        std::fs::write(
            external.join("lumen.json"),
            format!(
                r#"{{"name": "Lumen", "version": "1", "lang": "fr", "uri": "{LUMEN_URI}", "description": "Lumen gentium"}}"#
            ),
        )
        .unwrap();
        std::fs::write(
            external.join("dei.json"),
            r#"{"name": "Dei", "version": "1", "uri": "https://example.org/missing.html"}"#,
        )
        .unwrap();

        let settings = Settings {
            assets_dir: assets,
            external_sources_dir: external,
            ..Settings::default()
        };
        let backend = Arc::new(FakeBackend::standard());
        let cache = Arc::new(cache);
        let nav = Navigator::new(
            settings,
            Catalog::open_in_memory().unwrap(),
            backend.clone(),
            cache.clone(),
        );
        nav.sync_catalog(false).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = Arc::clone(&events);
            nav.subscribe(move |event| events.lock().push(event.clone()));
        }

        Self {
            nav,
            backend,
            cache,
            events,
            _dir: dir,
        }
    }

    fn take_events(&self) -> Vec<NavigationEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn markup(&self) -> Vec<String> {
        self.nav
            .content()
            .map(|c| c.sections.iter().map(|s| s.markup.clone()).collect())
            .unwrap_or_default()
    }
}

fn updated(kind: UpdateKind) -> NavigationEvent {
    NavigationEvent::ContextUpdated { kind }
}

fn state(state: NavigatorState) -> NavigationEvent {
    NavigationEvent::StateChanged { state }
}

// ---------------------------------------------------------------------------
// Bible documents
// ---------------------------------------------------------------------------

#[test]
fn goto_bible_verse_loads_chapter() {
    let mut h = Harness::new();
    assert_eq!(h.nav.state(), NavigatorState::Idle);

    let outcome = h.nav.goto("external-doc:/bible/John 1:1").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewDocument));
    assert_eq!(h.nav.state(), NavigatorState::Loaded);

    let ctx = h.nav.context();
    assert_eq!(ctx.title, "John 1:1");
    assert_eq!(ctx.short_title, "John 1");
    assert_eq!(ctx.document.as_deref(), Some("John"));
    assert_eq!(ctx.sources, vec!["MorphGNT", "FreCrampon"]);
    assert_eq!(ctx.available_sources, vec!["FreCrampon", "MorphGNT"]);
    assert_eq!(ctx.toc.as_ref().map(TableOfContents::len), Some(21));
    assert_eq!(
        h.markup(),
        vec!["<p>MorphGNT John 1</p>", "<p>FreCrampon John 1</p>"]
    );

    assert_eq!(
        h.take_events(),
        vec![
            state(NavigatorState::Loading),
            state(NavigatorState::Loaded),
            updated(UpdateKind::NewDocument),
        ]
    );
}

#[test]
fn same_uri_is_unchanged_and_silent() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1:1").unwrap();
    h.take_events();

    let outcome = h.nav.goto("external-doc:/bible/John 1:1").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::Unchanged));
    assert!(h.take_events().is_empty());
}

#[test]
fn other_verse_in_same_chapter_does_not_rerender() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1:1").unwrap();
    let renders = h.backend.render_calls();

    let outcome = h.nav.goto("external-doc:/bible/John 1:5").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewVerse));
    assert_eq!(h.backend.render_calls(), renders);
    assert_eq!(h.nav.context().title, "John 1:5");
    assert_eq!(h.markup().len(), 2);
}

#[test]
fn fragment_change_is_a_new_section() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1:1").unwrap();
    h.take_events();

    let outcome = h.nav.goto("external-doc:/bible/John 1:1#v3").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewSection));
    assert_eq!(h.take_events(), vec![updated(UpdateKind::NewSection)]);
    assert_eq!(h.nav.context().uri.as_ref().map(Uri::fragment), Some("v3"));
}

#[test]
fn new_chapter_keeps_the_table_of_contents() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1").unwrap();
    let toc = h.nav.context().toc.clone();

    let outcome = h.nav.goto("external-doc:/bible/John 2").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewDocument));
    assert_eq!(h.nav.context().toc, toc);

    h.nav.goto("external-doc:/bible/Genesis 1").unwrap();
    assert_eq!(h.nav.context().toc.as_ref().map(TableOfContents::len), Some(50));
}

#[test]
fn source_selection_follows_uri_then_defaults() {
    let mut h = Harness::new();

    h.nav.goto("external-doc:/bible/Genesis 1").unwrap();
    assert_eq!(h.nav.context().sources, vec!["OSHB", "FreCrampon"]);

    h.nav.goto("external-doc:/bible/Genesis 2?source=FreCrampon").unwrap();
    assert_eq!(h.nav.context().sources, vec!["FreCrampon"]);

    // Unknown names are dropped from an explicit list.
    h.nav
        .goto("external-doc:/bible/John 3?sources=Bogus;FreCrampon")
        .unwrap();
    assert_eq!(h.nav.context().sources, vec!["FreCrampon"]);
}

#[test]
fn missing_chapter_shows_placeholder() {
    let mut h = Harness::new();
    let outcome = h.nav.goto("external-doc:/bible/John 40").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewDocument));
    assert_eq!(h.nav.state(), NavigatorState::Loaded);
    assert_eq!(h.nav.context().title, "Not found");
    assert!(h.nav.content().is_some_and(|c| c.not_found));

    h.nav.goto("external-doc:/bible/Leviticus 1").unwrap();
    assert!(h.nav.content().is_some_and(|c| c.not_found));
}

// ---------------------------------------------------------------------------
// Chapter stepping and source selection
// ---------------------------------------------------------------------------

#[test]
fn chapter_stepping_respects_bounds() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 20").unwrap();

    let outcome = h.nav.next_chapter().unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewDocument));
    assert_eq!(h.nav.context().title, "John 21");

    let renders = h.backend.render_calls();
    h.take_events();
    assert_eq!(
        h.nav.next_chapter().unwrap(),
        GotoOutcome::Done(UpdateKind::Unchanged)
    );
    assert_eq!(h.backend.render_calls(), renders);
    assert!(h.take_events().is_empty());

    h.nav.goto("external-doc:/bible/John 1").unwrap();
    assert_eq!(
        h.nav.previous_chapter().unwrap(),
        GotoOutcome::Done(UpdateKind::Unchanged)
    );
}

#[test]
fn chapter_stepping_keeps_the_source_selection() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 3?sources=FreCrampon").unwrap();
    h.nav.previous_chapter().unwrap();
    assert_eq!(h.nav.context().title, "John 2");
    assert_eq!(h.nav.context().sources, vec!["FreCrampon"]);
}

#[test]
fn chapter_stepping_ignores_non_biblical_context() {
    let mut h = Harness::new();
    assert_eq!(
        h.nav.next_chapter().unwrap(),
        GotoOutcome::Done(UpdateKind::Unchanged)
    );
    h.nav.goto_welcome().unwrap();
    assert_eq!(
        h.nav.next_chapter().unwrap(),
        GotoOutcome::Done(UpdateKind::Unchanged)
    );
}

#[test]
fn removing_and_adding_sources() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1").unwrap();

    let outcome = h.nav.remove_source("FreCrampon").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::SourcesUpdated));
    assert_eq!(h.nav.context().sources, vec!["MorphGNT"]);
    assert_eq!(h.markup(), vec!["<p>MorphGNT John 1</p>"]);

    // The last source stays.
    assert_eq!(
        h.nav.remove_source("MorphGNT").unwrap(),
        GotoOutcome::Done(UpdateKind::Unchanged)
    );

    // The selection becomes the New Testament default.
    h.nav.goto("external-doc:/bible/Romans 1").unwrap();
    assert_eq!(h.nav.context().sources, vec!["MorphGNT"]);

    let outcome = h.nav.add_source("FreCrampon").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::SourcesUpdated));
    assert_eq!(h.nav.context().sources, vec!["MorphGNT", "FreCrampon"]);

    assert_eq!(
        h.nav.add_source("OSHB").unwrap(),
        GotoOutcome::Done(UpdateKind::Unchanged)
    );
}

// ---------------------------------------------------------------------------
// Internal screens
// ---------------------------------------------------------------------------

#[test]
fn welcome_screen_reads_asset() {
    let mut h = Harness::new();
    let outcome = h.nav.goto_welcome().unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewDocument));
    assert_eq!(h.nav.context().title, "Welcome");
    assert!(h.nav.context().toc.is_none());
    assert_eq!(h.markup(), vec!["<h1>Bienvenue</h1>"]);
}

#[test]
fn asset_paths_resolve_under_assets_dir() {
    let mut h = Harness::new();
    h.nav.goto("internal:/app/assets/css/theke.css").unwrap();
    assert_eq!(h.markup(), vec!["body {}"]);

    let err = h.nav.goto("internal:/app/assets/../secret.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedUri);

    h.nav.goto("internal:/app/nowhere").unwrap();
    assert!(h.nav.content().is_some_and(|c| c.not_found));
}

// ---------------------------------------------------------------------------
// Book modules and external documents
// ---------------------------------------------------------------------------

#[test]
fn book_module_defaults_to_cover_section() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/book/Amoris").unwrap();

    let ctx = h.nav.context();
    assert_eq!(ctx.title, "Amoris laetitia");
    assert_eq!(ctx.document.as_deref(), Some("Amoris"));
    let labels: Vec<&str> = ctx
        .toc
        .as_ref()
        .map(|t| t.entries.iter().map(|e| e.label.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(labels, vec!["Couverture", "1 to 3", "4"]);
    assert_eq!(h.markup(), vec!["La joie de l'amour"]);
    assert!(h.nav.catalog().get_document_id("Amoris").is_ok());

    h.nav.goto("external-doc:/book/Amoris/2").unwrap();
    assert_eq!(h.markup(), vec!["Paragraphe 2\nParagraphe 3"]);
}

#[test]
fn unknown_module_is_inaccessible_and_keeps_context() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1").unwrap();
    h.take_events();

    let err = h.nav.goto("external-doc:/book/Nope").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalSourceInaccessible);
    assert_eq!(h.nav.state(), NavigatorState::Error);
    assert_eq!(h.nav.context().title, "John 1");

    let events = h.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        NavigationEvent::NavigationError {
            kind: ErrorKind::ExternalSourceInaccessible,
            ..
        }
    )));
}

#[test]
fn web_uris_are_not_navigated() {
    let mut h = Harness::new();
    let err = h.nav.goto("web://example.org/page").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedScheme);
}

#[test]
fn external_document_is_fetched_in_background() {
    let mut h = Harness::new();
    let outcome = h.nav.goto("external-doc:/book/Lumen").unwrap();
    assert_eq!(outcome, GotoOutcome::Pending);
    assert_eq!(h.nav.state(), NavigatorState::Loading);
    assert!(h.nav.has_pending_work());

    assert_eq!(h.nav.poll_timeout(WAIT), 1);
    assert_eq!(h.nav.state(), NavigatorState::Loaded);
    assert_eq!(h.nav.context().title, "Lumen gentium");
    assert_eq!(h.markup(), vec!["<p>Lumen</p>"]);
    assert!(!h.nav.has_pending_work());

    // Cached now: the next visit is synchronous.
    h.nav.goto("external-doc:/bible/John 1").unwrap();
    let outcome = h.nav.goto("external-doc:/book/Lumen").unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewDocument));
    assert_eq!(h.cache.fetch_calls(), 1);
}

#[test]
fn failed_fetch_reports_error() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1").unwrap();
    h.take_events();

    assert_eq!(h.nav.goto("external-doc:/book/Dei").unwrap(), GotoOutcome::Pending);
    assert_eq!(h.nav.poll_timeout(WAIT), 1);
    assert_eq!(h.nav.state(), NavigatorState::Error);
    assert_eq!(h.nav.context().title, "John 1");
    assert!(h.take_events().iter().any(|e| matches!(
        e,
        NavigationEvent::NavigationError {
            kind: ErrorKind::ExternalSourceInaccessible,
            ..
        }
    )));
}

#[test]
fn latest_navigation_wins_over_slow_fetch() {
    let mut h = Harness::new();
    let release = h.cache.gate();

    assert_eq!(h.nav.goto("external-doc:/book/Lumen").unwrap(), GotoOutcome::Pending);
    h.nav.goto("external-doc:/bible/John 1").unwrap();
    release.send(()).unwrap();

    assert_eq!(h.nav.poll_timeout(WAIT), 0);
    assert_eq!(h.nav.context().title, "John 1");
    assert_eq!(h.nav.state(), NavigatorState::Loaded);
}

#[test]
fn returning_to_current_uri_supersedes_slow_fetch() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1").unwrap();
    let release = h.cache.gate();

    assert_eq!(h.nav.goto("external-doc:/book/Lumen").unwrap(), GotoOutcome::Pending);
    assert!(matches!(
        h.nav.goto("external-doc:/bible/John 1").unwrap(),
        GotoOutcome::Done(_)
    ));
    assert_eq!(h.nav.state(), NavigatorState::Loaded);
    assert!(!h.nav.has_pending_work());
    release.send(()).unwrap();

    assert_eq!(h.nav.poll_timeout(WAIT), 0);
    assert_eq!(h.nav.context().title, "John 1");
    assert_eq!(h.nav.state(), NavigatorState::Loaded);
}

#[test]
fn same_uri_after_error_recovers() {
    let mut h = Harness::new();
    h.nav.goto("external-doc:/bible/John 1").unwrap();
    h.nav.goto("external-doc:/book/Nope").unwrap_err();
    assert_eq!(h.nav.state(), NavigatorState::Error);
    h.take_events();

    h.nav.goto("external-doc:/bible/John 1").unwrap();
    assert_eq!(h.nav.state(), NavigatorState::Loaded);
    assert!(h.take_events().contains(&state(NavigatorState::Loaded)));
}

// ---------------------------------------------------------------------------
// Reload, search and subscriptions
// ---------------------------------------------------------------------------

#[test]
fn reload_rerenders_current_location() {
    let mut h = Harness::new();
    assert_eq!(
        h.nav.reload().unwrap(),
        GotoOutcome::Done(UpdateKind::Unchanged)
    );

    h.nav.goto("external-doc:/bible/John 1").unwrap();
    let renders = h.backend.render_calls();
    let outcome = h.nav.reload().unwrap();
    assert_eq!(outcome, GotoOutcome::Done(UpdateKind::NewDocument));
    assert_eq!(h.backend.render_calls(), renders + 2);
}

#[test]
fn search_reports_grouped_results() {
    let mut h = Harness::new();
    h.nav.search("MorphGNT", "agape");
    assert!(h.nav.is_searching());
    assert_eq!(h.nav.poll_timeout(WAIT), 1);
    assert!(!h.nav.is_searching());

    let results = h
        .take_events()
        .into_iter()
        .find_map(|e| match e {
            NavigationEvent::SearchFinished { results } => Some(results),
            _ => None,
        })
        .unwrap();
    assert_eq!(results.total, 3);
    assert_eq!(results.books["John"], vec!["John 3:16", "John 15:13"]);
    assert_eq!(results.books["Romans"], vec!["Romans 5:8"]);
}

#[test]
fn cancelled_search_is_discarded() {
    let mut h = Harness::new();
    h.nav.search("MorphGNT", "logos");
    h.nav.cancel_search();
    assert!(!h.nav.is_searching());

    assert_eq!(h.nav.poll_timeout(WAIT), 0);
    assert!(!h
        .take_events()
        .iter()
        .any(|e| matches!(e, NavigationEvent::SearchFinished { .. })));
}

#[test]
fn unsubscribed_listener_stops_receiving() {
    let mut h = Harness::new();
    let seen = Arc::new(Mutex::new(0usize));
    let id = {
        let seen = Arc::clone(&seen);
        h.nav.subscribe(move |_| *seen.lock() += 1)
    };

    h.nav.goto("external-doc:/bible/John 1").unwrap();
    let after_first = *seen.lock();
    assert!(after_first > 0);

    assert!(h.nav.unsubscribe(id));
    h.nav.goto("external-doc:/bible/John 2").unwrap();
    assert_eq!(*seen.lock(), after_first);
}
