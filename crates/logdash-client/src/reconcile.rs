//! Summary reconciliation.
//!
//! Every reconciliation fetches the full summary for a captured
//! [`RequestContext`] and replaces the display snapshot wholesale. Calls
//! never coordinate with each other; whichever response lands last wins.

use std::sync::Arc;

use logdash_core::context::RequestContext;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::event::{Operation, ViewEventKind, ViewEventSink};
use crate::service::DashboardBackend;
use crate::state::DashboardHandle;

/// How a reconciliation presents itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Background refresh: no loading indicator, failures only logged.
    Silent,
    /// User-initiated: loading indicator around the call, failures surfaced.
    Interactive,
}

pub struct Reconciler {
    backend: Arc<dyn DashboardBackend>,
    state: DashboardHandle,
    events: Arc<dyn ViewEventSink>,
}

impl Reconciler {
    pub fn new(
        backend: Arc<dyn DashboardBackend>,
        state: DashboardHandle,
        events: Arc<dyn ViewEventSink>,
    ) -> Self {
        Self {
            backend,
            state,
            events,
        }
    }

    /// Fetch and install a new snapshot; returns its generation.
    ///
    /// In interactive mode loading is shown and hidden exactly once per call
    /// whatever the outcome.
    pub async fn reconcile(
        &self,
        mode: ReconcileMode,
        context: RequestContext,
    ) -> Result<u64, ClientError> {
        match mode {
            ReconcileMode::Silent => {
                let result = self.fetch_and_replace(context).await;
                if let Err(err) = &result {
                    warn!(error = %err, "silent reconciliation failed");
                }
                result
            }
            ReconcileMode::Interactive => {
                self.events.emit(ViewEventKind::Loading { visible: true });
                let result = self.fetch_and_replace(context).await;
                self.events.emit(ViewEventKind::Loading { visible: false });
                match &result {
                    Ok(generation) => {
                        info!(generation, "analysis loaded");
                        self.events.emit(ViewEventKind::ContentVisible);
                    }
                    Err(err) => {
                        warn!(error = %err, "analysis failed");
                        self.events.emit(ViewEventKind::ErrorSurfaced {
                            operation: Operation::Analyze,
                            message: err.to_string(),
                        });
                    }
                }
                result
            }
        }
    }

    async fn fetch_and_replace(&self, context: RequestContext) -> Result<u64, ClientError> {
        if context.source.is_empty() {
            return Err(ClientError::NoSource);
        }
        debug!(
            source = %context.source,
            filter_bots = context.filter_bots,
            "requesting analysis"
        );
        let summary = self.backend.analyze(&context).await?;
        self.state.replace_snapshot(context, summary).await
    }
}
