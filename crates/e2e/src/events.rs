//! Console and page-error capture

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Kind of signal emitted by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Error,
    Warning,
    Log,
    UncaughtException,
}

impl EventKind {
    /// Error-class events are the ones that fail a run.
    pub fn is_error(self) -> bool {
        matches!(self, EventKind::Error | EventKind::UncaughtException)
    }
}

/// One console/page signal, immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedEvent {
    pub kind: EventKind,
    pub text: String,
    /// Source location (url:line:col) when the protocol reports one
    pub location: Option<String>,
}

/// Append-only log of everything a session's page emitted. Listener tasks
/// are the only writers; flows read through [`drain`](ConsoleLog::drain)
/// after an explicit settle window, since delivery is asynchronous relative
/// to the flow's own waits.
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    inner: Arc<Mutex<Vec<ObservedEvent>>>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event. Called from the listener tasks.
    pub fn push(&self, event: ObservedEvent) {
        self.inner.lock().expect("console log poisoned").push(event);
    }

    /// Non-destructive snapshot in emission order. Repeated calls reflect
    /// the growing log.
    pub fn drain(&self) -> Vec<ObservedEvent> {
        self.inner.lock().expect("console log poisoned").clone()
    }

    /// Only error-class events (console errors and uncaught exceptions).
    pub fn errors(&self) -> Vec<ObservedEvent> {
        self.drain()
            .into_iter()
            .filter(|e| e.kind.is_error())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, text: &str) -> ObservedEvent {
        ObservedEvent {
            kind,
            text: text.to_string(),
            location: None,
        }
    }

    #[test]
    fn drain_is_non_destructive_and_ordered() {
        let log = ConsoleLog::new();
        log.push(event(EventKind::Log, "first"));
        log.push(event(EventKind::Error, "second"));

        let snapshot = log.drain();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].text, "first");
        assert_eq!(snapshot[1].text, "second");

        // A second drain sees the same log, plus anything new.
        log.push(event(EventKind::Warning, "third"));
        assert_eq!(log.drain().len(), 3);
    }

    #[test]
    fn errors_filters_to_error_class_events() {
        let log = ConsoleLog::new();
        log.push(event(EventKind::Log, "noise"));
        log.push(event(EventKind::Warning, "deprecation"));
        log.push(event(EventKind::Error, "boom"));
        log.push(event(EventKind::UncaughtException, "TypeError: x is null"));

        let errors = log.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind.is_error()));
    }
}
