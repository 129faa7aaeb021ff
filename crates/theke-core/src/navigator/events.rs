//! Typed navigation events and the subscriber registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::errors::ErrorKind;
use crate::query::search::SearchResults;

/// What changed in the navigation context after a successful navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Nothing changed; never emitted.
    Unchanged,
    NewDocument,
    /// Only the fragment changed; the content was not reloaded.
    NewSection,
    /// Same chapter, different verse; the content was not re-rendered.
    NewVerse,
    SourcesUpdated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigatorState {
    Idle,
    Loading,
    Loaded,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NavigationEvent {
    ContextUpdated { kind: UpdateKind },
    NavigationError { kind: ErrorKind, message: String },
    StateChanged { state: NavigatorState },
    SearchFinished { results: SearchResults },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&NavigationEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<IndexMap<SubscriptionId, Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&NavigationEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().insert(id, Arc::new(listener));
        id
    }

    /// Returns `false` when the id was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.lock().shift_remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver `event` to every listener in subscription order. The registry
    /// lock is released before listeners run, so they may (un)subscribe.
    pub fn emit(&self, event: &NavigationEvent) {
        let listeners: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_order_until_unsubscribed() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| seen.lock().push("first"))
        };
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| seen.lock().push("second"));
        }

        let event = NavigationEvent::ContextUpdated {
            kind: UpdateKind::NewDocument,
        };
        bus.emit(&event);
        assert!(bus.unsubscribe(first));
        assert!(!bus.unsubscribe(first));
        bus.emit(&event);

        assert_eq!(*seen.lock(), vec!["first", "second", "second"]);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(move |_| {
            inner.subscribe(|_| {});
        });
        bus.emit(&NavigationEvent::StateChanged {
            state: NavigatorState::Loading,
        });
        assert_eq!(bus.listener_count(), 2);
    }
}
