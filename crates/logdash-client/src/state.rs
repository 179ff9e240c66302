//! Display state and the task that owns it.
//!
//! The tail poll, reconciliation and enrichment timelines never share the
//! display state directly. Each sends one of three patch kinds to a single
//! owning task through a [`DashboardHandle`]:
//!
//! - replace-wholesale (a new summary snapshot),
//! - append-only (tail lines for the active tail epoch),
//! - per-key patch (one ranked client's resolution record).
//!
//! Because the owner applies commands one at a time, there are no lost
//! updates. Stale work is rejected by comparing generation and epoch tags.

use std::sync::Arc;

use logdash_core::context::RequestContext;
use logdash_core::summary::AnalysisSummary;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::buffer::{ScrollingBuffer, TailLine};
use crate::error::ClientError;
use crate::event::{ViewEventKind, ViewEventSink};

const COMMAND_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Resolution records
// ---------------------------------------------------------------------------

/// Lifecycle of one ranked client's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionState {
    Unresolved,
    InFlight,
    Resolved,
    Failed,
}

impl ResolutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::InFlight => "in_flight",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Region indicator attached to a resolved client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    Country { name: String, code: String },
    /// Private, loopback or link-local address; never geolocated.
    LocalOrigin,
}

/// Metadata resolved for one ranked client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRecord {
    pub state: ResolutionState,
    pub display_name: Option<String>,
    pub region: Option<Region>,
}

impl Default for ResolutionRecord {
    fn default() -> Self {
        Self::unresolved()
    }
}

impl ResolutionRecord {
    /// Shown for unresolved clients and for anything that did not resolve.
    pub const PLACEHOLDER: &'static str = "-";
    /// Shown in place of a missing name on a resolved client.
    pub const UNKNOWN_NAME: &'static str = "?";

    pub fn unresolved() -> Self {
        Self {
            state: ResolutionState::Unresolved,
            display_name: None,
            region: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            state: ResolutionState::Failed,
            display_name: None,
            region: None,
        }
    }

    pub fn resolved(display_name: Option<String>, region: Option<Region>) -> Self {
        Self {
            state: ResolutionState::Resolved,
            display_name,
            region,
        }
    }

    /// Text for the resolution column.
    pub fn label(&self) -> String {
        match self.state {
            ResolutionState::Unresolved | ResolutionState::Failed => Self::PLACEHOLDER.to_string(),
            ResolutionState::InFlight => "...".to_string(),
            ResolutionState::Resolved => {
                let name = self.display_name.as_deref().unwrap_or(Self::UNKNOWN_NAME);
                match &self.region {
                    Some(Region::Country { code, .. }) => {
                        format!("[{}] {name}", code.to_ascii_uppercase())
                    }
                    Some(Region::LocalOrigin) => format!("[local] {name}"),
                    None => name.to_string(),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// One row of the ranked client table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityView {
    pub slot: usize,
    pub identifier: String,
    pub count: u64,
    pub record: ResolutionRecord,
}

/// Read-only copy of the display state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayView {
    /// Incremented on every snapshot replacement; zero before the first.
    pub generation: u64,
    pub context: Option<RequestContext>,
    pub summary: Option<Arc<AnalysisSummary>>,
    pub entities: Vec<EntityView>,
    /// Tail lines, newest first.
    pub tail: Vec<TailLine>,
    pub tail_visible: bool,
    pub tail_waiting: bool,
}

/// Ranked client identifiers of one snapshot generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    pub generation: u64,
    pub identifiers: Vec<String>,
}

/// Who is asking to resolve a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Resolve-all pass: skips Resolved and InFlight records.
    Bulk,
    /// Direct user request: may re-issue a Resolved or Failed record.
    Explicit,
}

/// Answer to a request to mark a slot in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginResolve {
    Started { generation: u64, identifier: String },
    Skipped {
        identifier: String,
        state: ResolutionState,
    },
    Stale,
    UnknownSlot,
    NoSnapshot,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Snapshot {
    context: RequestContext,
    summary: Arc<AnalysisSummary>,
}

/// The display state itself. Only the owning task mutates it.
#[derive(Debug)]
pub struct DisplayState {
    generation: u64,
    snapshot: Option<Snapshot>,
    records: Vec<ResolutionRecord>,
    buffer: ScrollingBuffer,
    tail_epoch: Option<u64>,
    tail_visible: bool,
    tail_waiting: bool,
}

impl DisplayState {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            generation: 0,
            snapshot: None,
            records: Vec::new(),
            buffer: ScrollingBuffer::with_capacity(buffer_capacity),
            tail_epoch: None,
            tail_visible: false,
            tail_waiting: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the snapshot wholesale; all resolution records start over.
    pub fn replace_snapshot(&mut self, context: RequestContext, summary: AnalysisSummary) -> u64 {
        self.generation += 1;
        self.records = vec![ResolutionRecord::unresolved(); summary.top_clients.len()];
        self.snapshot = Some(Snapshot {
            context,
            summary: Arc::new(summary),
        });
        self.generation
    }

    pub fn open_tail(&mut self, epoch: u64) {
        self.tail_epoch = Some(epoch);
        self.tail_visible = true;
        // Lines kept from an earlier activation stay on screen.
        self.tail_waiting = self.buffer.is_empty();
    }

    /// Returns false when `epoch` is not the active tail epoch.
    pub fn close_tail(&mut self, epoch: u64) -> bool {
        if self.tail_epoch != Some(epoch) {
            return false;
        }
        self.tail_epoch = None;
        self.tail_visible = false;
        true
    }

    /// Merge lines tagged with `epoch`; lines from any other epoch are dropped.
    pub fn append_tail(&mut self, epoch: u64, lines: &[TailLine]) -> bool {
        if self.tail_epoch != Some(epoch) {
            return false;
        }
        if !lines.is_empty() {
            self.buffer.merge(lines.iter().cloned());
            self.tail_waiting = false;
        }
        true
    }

    pub fn clear_tail(&mut self) {
        self.buffer.clear();
        self.tail_waiting = true;
    }

    pub fn ranking(&self) -> Option<Ranking> {
        let snapshot = self.snapshot.as_ref()?;
        Some(Ranking {
            generation: self.generation,
            identifiers: snapshot
                .summary
                .client_identifiers()
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn record(&self, generation: u64, slot: usize) -> Option<&ResolutionRecord> {
        if generation != self.generation {
            return None;
        }
        self.records.get(slot)
    }

    /// Mark `slot` in flight if `mode` allows it.
    ///
    /// `generation: None` means "whatever snapshot is current".
    pub fn begin_resolve(
        &mut self,
        generation: Option<u64>,
        slot: usize,
        mode: ResolveMode,
    ) -> BeginResolve {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return BeginResolve::NoSnapshot;
        };
        if generation.is_some_and(|g| g != self.generation) {
            return BeginResolve::Stale;
        }
        let Some(entry) = snapshot.summary.top_clients.get(slot) else {
            return BeginResolve::UnknownSlot;
        };
        let identifier = entry.value().to_string();

        let current = self.records[slot].state;
        let identifier_in_flight = snapshot
            .summary
            .top_clients
            .iter()
            .zip(&self.records)
            .any(|(e, r)| r.state == ResolutionState::InFlight && e.value() == identifier);
        if identifier_in_flight {
            return BeginResolve::Skipped {
                identifier,
                state: ResolutionState::InFlight,
            };
        }
        if mode == ResolveMode::Bulk && current == ResolutionState::Resolved {
            return BeginResolve::Skipped {
                identifier,
                state: current,
            };
        }

        self.records[slot].state = ResolutionState::InFlight;
        BeginResolve::Started {
            generation: self.generation,
            identifier,
        }
    }

    /// Store a finished record; dropped when the snapshot has moved on.
    pub fn finish_resolve(&mut self, generation: u64, slot: usize, record: ResolutionRecord) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.records.get_mut(slot) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    fn identifier(&self, slot: usize) -> String {
        self.snapshot
            .as_ref()
            .and_then(|s| s.summary.top_clients.get(slot))
            .map(|e| e.value().to_string())
            .unwrap_or_default()
    }

    pub fn view(&self) -> DisplayView {
        let (context, summary, entities) = match &self.snapshot {
            Some(snapshot) => {
                let entities = snapshot
                    .summary
                    .top_clients
                    .iter()
                    .zip(&self.records)
                    .enumerate()
                    .map(|(slot, (entry, record))| EntityView {
                        slot,
                        identifier: entry.value().to_string(),
                        count: entry.count(),
                        record: record.clone(),
                    })
                    .collect();
                (
                    Some(snapshot.context.clone()),
                    Some(Arc::clone(&snapshot.summary)),
                    entities,
                )
            }
            None => (None, None, Vec::new()),
        };
        DisplayView {
            generation: self.generation,
            context,
            summary,
            entities,
            tail: self.buffer.to_vec(),
            tail_visible: self.tail_visible,
            tail_waiting: self.tail_waiting,
        }
    }

    fn apply(&mut self, command: StateCommand, events: &dyn ViewEventSink) {
        match command {
            StateCommand::ReplaceSnapshot {
                context,
                summary,
                reply,
            } => {
                let total_requests = summary.total_requests;
                let generation = self.replace_snapshot(context, summary);
                debug!(generation, total_requests, "display snapshot replaced");
                events.emit(ViewEventKind::SnapshotReplaced {
                    generation,
                    total_requests,
                });
                let _ = reply.send(generation);
            }
            StateCommand::OpenTail { epoch, reply } => {
                self.open_tail(epoch);
                events.emit(ViewEventKind::TailView { visible: true });
                let _ = reply.send(());
            }
            StateCommand::CloseTail { epoch, reply } => {
                if self.close_tail(epoch) {
                    events.emit(ViewEventKind::TailView { visible: false });
                }
                let _ = reply.send(());
            }
            StateCommand::AppendTail {
                epoch,
                lines,
                reply,
            } => {
                let lines: Vec<TailLine> = lines.into_iter().map(TailLine::new).collect();
                let accepted = self.append_tail(epoch, &lines);
                if !accepted {
                    debug!(epoch, count = lines.len(), "dropped tail lines from inactive epoch");
                } else if !lines.is_empty() {
                    trace!(epoch, count = lines.len(), "merged tail lines");
                    events.emit(ViewEventKind::TailAppended { lines });
                }
                let _ = reply.send(accepted);
            }
            StateCommand::ClearTail { reply } => {
                self.clear_tail();
                events.emit(ViewEventKind::TailCleared);
                let _ = reply.send(());
            }
            StateCommand::Ranking { reply } => {
                let _ = reply.send(self.ranking());
            }
            StateCommand::RecordState {
                generation,
                slot,
                reply,
            } => {
                let _ = reply.send(self.record(generation, slot).map(|r| r.state));
            }
            StateCommand::BeginResolve {
                generation,
                slot,
                mode,
                reply,
            } => {
                let outcome = self.begin_resolve(generation, slot, mode);
                if let BeginResolve::Started { identifier, .. } = &outcome {
                    events.emit(ViewEventKind::EntityPatched {
                        slot,
                        identifier: identifier.clone(),
                        record: self.records[slot].clone(),
                    });
                }
                let _ = reply.send(outcome);
            }
            StateCommand::FinishResolve {
                generation,
                slot,
                record,
                reply,
            } => {
                let stored = self.finish_resolve(generation, slot, record.clone());
                if stored {
                    events.emit(ViewEventKind::EntityPatched {
                        slot,
                        identifier: self.identifier(slot),
                        record,
                    });
                } else {
                    debug!(generation, slot, "dropped resolution for replaced snapshot");
                }
                let _ = reply.send(stored);
            }
            StateCommand::View { reply } => {
                let _ = reply.send(self.view());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Owning task
// ---------------------------------------------------------------------------

enum StateCommand {
    ReplaceSnapshot {
        context: RequestContext,
        summary: AnalysisSummary,
        reply: oneshot::Sender<u64>,
    },
    OpenTail {
        epoch: u64,
        reply: oneshot::Sender<()>,
    },
    CloseTail {
        epoch: u64,
        reply: oneshot::Sender<()>,
    },
    AppendTail {
        epoch: u64,
        lines: Vec<String>,
        reply: oneshot::Sender<bool>,
    },
    ClearTail {
        reply: oneshot::Sender<()>,
    },
    Ranking {
        reply: oneshot::Sender<Option<Ranking>>,
    },
    RecordState {
        generation: u64,
        slot: usize,
        reply: oneshot::Sender<Option<ResolutionState>>,
    },
    BeginResolve {
        generation: Option<u64>,
        slot: usize,
        mode: ResolveMode,
        reply: oneshot::Sender<BeginResolve>,
    },
    FinishResolve {
        generation: u64,
        slot: usize,
        record: ResolutionRecord,
        reply: oneshot::Sender<bool>,
    },
    View {
        reply: oneshot::Sender<DisplayView>,
    },
}

/// Cloneable handle to the task that owns the display state.
#[derive(Clone)]
pub struct DashboardHandle {
    tx: mpsc::Sender<StateCommand>,
}

/// Spawn the owning task on the current tokio runtime.
///
/// The task exits once every handle has been dropped.
pub fn spawn_state_actor(buffer_capacity: usize, events: Arc<dyn ViewEventSink>) -> DashboardHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    tokio::spawn(run_state_actor(DisplayState::new(buffer_capacity), rx, events));
    DashboardHandle { tx }
}

async fn run_state_actor(
    mut state: DisplayState,
    mut rx: mpsc::Receiver<StateCommand>,
    events: Arc<dyn ViewEventSink>,
) {
    while let Some(command) = rx.recv().await {
        state.apply(command, events.as_ref());
    }
    debug!(generation = state.generation(), "display state owner stopped");
}

impl DashboardHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StateCommand,
    ) -> Result<T, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ClientError::StateClosed)?;
        rx.await.map_err(|_| ClientError::StateClosed)
    }

    /// Replace the snapshot; returns the new generation.
    pub async fn replace_snapshot(
        &self,
        context: RequestContext,
        summary: AnalysisSummary,
    ) -> Result<u64, ClientError> {
        self.request(|reply| StateCommand::ReplaceSnapshot {
            context,
            summary,
            reply,
        })
        .await
    }

    pub async fn open_tail(&self, epoch: u64) -> Result<(), ClientError> {
        self.request(|reply| StateCommand::OpenTail { epoch, reply }).await
    }

    pub async fn close_tail(&self, epoch: u64) -> Result<(), ClientError> {
        self.request(|reply| StateCommand::CloseTail { epoch, reply }).await
    }

    /// Returns false when the lines were dropped for a stale epoch.
    pub async fn append_tail(&self, epoch: u64, lines: Vec<String>) -> Result<bool, ClientError> {
        self.request(|reply| StateCommand::AppendTail {
            epoch,
            lines,
            reply,
        })
        .await
    }

    pub async fn clear_tail(&self) -> Result<(), ClientError> {
        self.request(|reply| StateCommand::ClearTail { reply }).await
    }

    pub async fn ranking(&self) -> Result<Option<Ranking>, ClientError> {
        self.request(|reply| StateCommand::Ranking { reply }).await
    }

    /// State of `slot` in `generation`; `None` once that generation is gone.
    pub async fn record_state(
        &self,
        generation: u64,
        slot: usize,
    ) -> Result<Option<ResolutionState>, ClientError> {
        self.request(|reply| StateCommand::RecordState {
            generation,
            slot,
            reply,
        })
        .await
    }

    pub async fn begin_resolve(
        &self,
        generation: Option<u64>,
        slot: usize,
        mode: ResolveMode,
    ) -> Result<BeginResolve, ClientError> {
        self.request(|reply| StateCommand::BeginResolve {
            generation,
            slot,
            mode,
            reply,
        })
        .await
    }

    /// Returns false when the record was dropped for a replaced snapshot.
    pub async fn finish_resolve(
        &self,
        generation: u64,
        slot: usize,
        record: ResolutionRecord,
    ) -> Result<bool, ClientError> {
        self.request(|reply| StateCommand::FinishResolve {
            generation,
            slot,
            record,
            reply,
        })
        .await
    }

    pub async fn view(&self) -> Result<DisplayView, ClientError> {
        self.request(|reply| StateCommand::View { reply }).await
    }
}
