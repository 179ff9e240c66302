//! Live tail synchronization.
//!
//! A [`TailSynchronizer`] owns the read cursor for one activation at a time.
//! While active it polls the backend on a fixed interval and hands new lines
//! to the display state. Appended lines signal a separate refresh task that
//! reconciles the summary silently, so a slow analysis never holds up the
//! next poll. Signals raised while a refresh is running collapse into one.
//!
//! Each activation gets a fresh epoch. Polls carry the epoch they were
//! issued under, so a response that lands after `stop` (or after a later
//! `start`) neither moves the cursor nor reaches the buffer. Polls within an
//! activation run one at a time, so every request carries the cursor the
//! previous one returned.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use logdash_core::config::MIN_POLL_INTERVAL;
use logdash_core::context::{RequestContext, SourceId};
use tokio::sync::{watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BackendError, ClientError};
use crate::reconcile::{ReconcileMode, Reconciler};
use crate::service::DashboardBackend;
use crate::state::DashboardHandle;
use crate::types::TailCursor;

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Tailing is not active.
    Inactive,
    /// The cursor advanced and no lines arrived.
    Empty,
    /// Lines were merged and a silent reconciliation was requested.
    Appended { count: usize },
    /// The activation ended while the request was in flight.
    Stale,
    /// The backend rejected the cursor; it was reset to the end.
    CursorReset,
    /// The request failed; the cursor is unchanged.
    Failed,
}

struct Activation {
    epoch: u64,
    source: SourceId,
    cancel: CancellationToken,
    refresh: Arc<Notify>,
}

/// What a poll needs to know about the activation it runs under.
#[derive(Clone)]
struct PollTarget {
    epoch: u64,
    source: SourceId,
    refresh: Arc<Notify>,
}

struct TailInner {
    last_epoch: u64,
    active: Option<Activation>,
    cursor: TailCursor,
}

struct Shared {
    backend: Arc<dyn DashboardBackend>,
    state: DashboardHandle,
    reconciler: Arc<Reconciler>,
    context: watch::Receiver<RequestContext>,
    poll_interval: Duration,
    inner: Mutex<TailInner>,
    /// Serializes start and stop.
    control: tokio::sync::Mutex<()>,
    /// Held for a whole poll, from reading the cursor to appending lines.
    poll_gate: tokio::sync::Mutex<()>,
}

pub struct TailSynchronizer {
    shared: Arc<Shared>,
}

impl TailSynchronizer {
    /// `context` is read when a refresh runs, so filter changes made while
    /// tailing apply to the next refresh. Intervals below 100ms are raised
    /// to 100ms.
    pub fn new(
        backend: Arc<dyn DashboardBackend>,
        state: DashboardHandle,
        reconciler: Arc<Reconciler>,
        context: watch::Receiver<RequestContext>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                state,
                reconciler,
                context,
                poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
                inner: Mutex::new(TailInner {
                    last_epoch: 0,
                    active: None,
                    cursor: TailCursor::End,
                }),
                control: tokio::sync::Mutex::new(()),
                poll_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Begin tailing `context.source` from its current end.
    ///
    /// Returns `Ok(false)` without side effects if already active.
    pub async fn start(&self, context: &RequestContext) -> Result<bool, ClientError> {
        if context.source.is_empty() {
            return Err(ClientError::NoSource);
        }
        let _control = self.shared.control.lock().await;

        let cancel = CancellationToken::new();
        let refresh = Arc::new(Notify::new());
        let epoch = {
            let mut inner = self.shared.lock();
            if inner.active.is_some() {
                debug!("tail already active");
                return Ok(false);
            }
            inner.last_epoch += 1;
            inner.cursor = TailCursor::End;
            inner.active = Some(Activation {
                epoch: inner.last_epoch,
                source: context.source.clone(),
                cancel: cancel.clone(),
                refresh: Arc::clone(&refresh),
            });
            inner.last_epoch
        };

        if let Err(err) = self.shared.state.open_tail(epoch).await {
            self.shared.lock().active = None;
            return Err(err);
        }

        let target = PollTarget {
            epoch,
            source: context.source.clone(),
            refresh,
        };
        tokio::spawn(refresh_loop(Arc::clone(&self.shared), target.clone(), cancel.clone()));
        tokio::spawn(poll_loop(Arc::clone(&self.shared), target, cancel));
        info!(source = %context.source, epoch, "tailing started");
        Ok(true)
    }

    /// Cancel the schedule and hide the view. The buffer is kept.
    ///
    /// Returns `Ok(false)` if tailing was not active.
    pub async fn stop(&self) -> Result<bool, ClientError> {
        let _control = self.shared.control.lock().await;
        let Some(activation) = self.shared.lock().active.take() else {
            return Ok(false);
        };
        activation.cancel.cancel();
        self.shared.state.close_tail(activation.epoch).await?;
        info!(source = %activation.source, epoch = activation.epoch, "tailing stopped");
        Ok(true)
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().active.is_some()
    }

    /// Cursor the next poll will send.
    pub fn cursor(&self) -> TailCursor {
        self.shared.lock().cursor
    }

    /// Epoch of the current activation, if any.
    pub fn epoch(&self) -> Option<u64> {
        self.shared.lock().active.as_ref().map(|a| a.epoch)
    }

    pub fn poll_interval(&self) -> Duration {
        self.shared.poll_interval
    }

    /// Poll once right now for the current activation.
    ///
    /// Waits for a scheduled poll that is already running.
    pub async fn poll_once(&self) -> PollOutcome {
        let target = {
            let inner = self.shared.lock();
            inner.active.as_ref().map(|a| PollTarget {
                epoch: a.epoch,
                source: a.source.clone(),
                refresh: Arc::clone(&a.refresh),
            })
        };
        match target {
            Some(target) => self.shared.poll(&target).await,
            None => PollOutcome::Inactive,
        }
    }
}

impl Drop for TailSynchronizer {
    fn drop(&mut self) {
        if let Some(activation) = self.shared.lock().active.take() {
            activation.cancel.cancel();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TailInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cursor for `epoch`, or `None` once that activation has ended.
    fn cursor_for(&self, epoch: u64) -> Option<TailCursor> {
        let inner = self.lock();
        match &inner.active {
            Some(active) if active.epoch == epoch => Some(inner.cursor),
            _ => None,
        }
    }

    /// Overwrite the cursor if `epoch` is still active.
    fn set_cursor(&self, epoch: u64, cursor: TailCursor) -> bool {
        let mut inner = self.lock();
        match &inner.active {
            Some(active) if active.epoch == epoch => {
                inner.cursor = cursor;
                true
            }
            _ => false,
        }
    }

    async fn poll(&self, target: &PollTarget) -> PollOutcome {
        let _gate = self.poll_gate.lock().await;
        let epoch = target.epoch;
        let source = &target.source;
        let Some(cursor) = self.cursor_for(epoch) else {
            return PollOutcome::Stale;
        };

        let batch = match self.backend.tail(source, cursor).await {
            Ok(batch) => batch,
            Err(BackendError::CursorOutOfRange { cursor: rejected, .. }) => {
                if !self.set_cursor(epoch, TailCursor::End) {
                    return PollOutcome::Stale;
                }
                warn!(%source, cursor = rejected, "tail cursor out of range, resuming from end");
                return PollOutcome::CursorReset;
            }
            Err(err) => {
                warn!(%source, %cursor, error = %err, "tail poll failed");
                return PollOutcome::Failed;
            }
        };

        if !self.set_cursor(epoch, TailCursor::Offset(batch.next_cursor)) {
            debug!(%source, epoch, "discarding tail response for ended activation");
            return PollOutcome::Stale;
        }
        if batch.lines.is_empty() {
            return PollOutcome::Empty;
        }

        let count = batch.lines.len();
        match self.state.append_tail(epoch, batch.lines).await {
            Ok(true) => {}
            Ok(false) => return PollOutcome::Stale,
            Err(err) => {
                warn!(error = %err, "could not append tail lines");
                return PollOutcome::Failed;
            }
        }
        debug!(%source, count, next_cursor = batch.next_cursor, "tail lines appended");
        target.refresh.notify_one();
        PollOutcome::Appended { count }
    }

    async fn refresh(&self, source: &SourceId) {
        let context = self.context.borrow().clone().with_source(source.clone());
        // Failures are logged by the reconciler and otherwise ignored.
        let _ = self.reconciler.reconcile(ReconcileMode::Silent, context).await;
    }
}

async fn poll_loop(shared: Arc<Shared>, target: PollTarget, cancel: CancellationToken) {
    let period = shared.poll_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        // An in-flight poll is allowed to finish; its result is
        // filtered by epoch.
        if shared.poll(&target).await == PollOutcome::Stale {
            break;
        }
    }
    debug!(source = %target.source, epoch = target.epoch, "tail poll loop exited");
}

async fn refresh_loop(shared: Arc<Shared>, target: PollTarget, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = target.refresh.notified() => {}
        }
        shared.refresh(&target.source).await;
    }
    debug!(source = %target.source, epoch = target.epoch, "tail refresh loop exited");
}
