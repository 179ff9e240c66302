//! View events emitted by the engine for the presentation layer.
//!
//! Loading indicators, error messages, tail visibility and per-entity
//! patches are all reported through a `ViewEventSink`, so presentation
//! stays a pure projection and tests can assert on exactly what a user
//! would have seen.

use chrono::{DateTime, Utc};

use crate::buffer::TailLine;
use crate::state::ResolutionRecord;

/// User-facing operation whose failure can be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Analyze,
    ResolveClient,
    ClientHistory,
    Browse,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Analyze => "analyze",
            Self::ResolveClient => "resolve_client",
            Self::ClientHistory => "client_history",
            Self::Browse => "browse",
        };
        f.write_str(s)
    }
}

/// What changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEventKind {
    /// The loading indicator was shown or hidden.
    Loading { visible: bool },
    /// The summary view became visible after an interactive fetch.
    ContentVisible,
    /// A failure the user should see.
    ErrorSurfaced { operation: Operation, message: String },
    /// The display snapshot was replaced.
    SnapshotReplaced { generation: u64, total_requests: u64 },
    /// The live tail view was shown or hidden.
    TailView { visible: bool },
    /// New lines were merged into the tail buffer, oldest first.
    TailAppended { lines: Vec<TailLine> },
    /// The tail buffer was cleared by the user.
    TailCleared,
    /// One ranked client's resolution record changed.
    EntityPatched {
        slot: usize,
        identifier: String,
        record: ResolutionRecord,
    },
    /// The resolve-all control was enabled or disabled.
    ResolveControl { enabled: bool },
}

/// An event with the time it was emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: ViewEventKind,
}

impl ViewEvent {
    pub fn new(kind: ViewEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Receiver of view events.
///
/// Called from the engine's tasks; implementations must not block.
pub trait ViewEventSink: Send + Sync {
    fn record(&self, event: ViewEvent);

    fn emit(&self, kind: ViewEventKind) {
        self.record(ViewEvent::new(kind));
    }
}

/// In-memory event sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: std::sync::Mutex<Vec<ViewEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<ViewEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// Number of recorded events matching `predicate`.
    pub fn count_where(&self, predicate: impl Fn(&ViewEventKind) -> bool) -> usize {
        self.kinds().iter().filter(|k| predicate(k)).count()
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl ViewEventSink for InMemoryEventSink {
    fn record(&self, event: ViewEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Event sink that forwards into an unbounded channel.
///
/// Lets a single consumer (the terminal renderer) own output while the
/// engine's tasks emit from anywhere.
pub struct ChannelEventSink {
    tx: tokio::sync::mpsc::UnboundedSender<ViewEvent>,
}

impl ChannelEventSink {
    pub fn channel() -> (Self, tokio::sync::mpsc::UnboundedReceiver<ViewEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ViewEventSink for ChannelEventSink {
    fn record(&self, event: ViewEvent) {
        // The receiver going away just means nobody is rendering anymore.
        let _ = self.tx.send(event);
    }
}

/// No-op event sink that discards all events.
pub struct NullEventSink;

impl ViewEventSink for NullEventSink {
    fn record(&self, _event: ViewEvent) {}
}
