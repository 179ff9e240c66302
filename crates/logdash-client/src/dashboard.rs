//! The dashboard facade.
//!
//! Wires the tail synchronizer, the reconciler and the enrichment scheduler
//! to one display-state owner and one request-context holder.

use std::sync::Arc;

use logdash_core::config::Config;
use logdash_core::context::{DateRange, RequestContext, SourceId};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::enrich::{EnrichmentScheduler, ResolveAllReport};
use crate::error::ClientError;
use crate::event::{Operation, ViewEventKind, ViewEventSink};
use crate::reconcile::{ReconcileMode, Reconciler};
use crate::service::{DashboardBackend, GeoLocator};
use crate::state::{spawn_state_actor, DashboardHandle, DisplayView, ResolutionRecord};
use crate::tail::TailSynchronizer;
use crate::types::{BrowseListing, HistoryEntry};

pub struct Dashboard {
    backend: Arc<dyn DashboardBackend>,
    events: Arc<dyn ViewEventSink>,
    state: DashboardHandle,
    context: watch::Sender<RequestContext>,
    reconciler: Arc<Reconciler>,
    tail: TailSynchronizer,
    enrichment: EnrichmentScheduler,
}

impl Dashboard {
    /// Build the engine and spawn its state owner on the current runtime.
    pub fn new(
        config: &Config,
        backend: Arc<dyn DashboardBackend>,
        geo: Option<Arc<dyn GeoLocator>>,
        events: Arc<dyn ViewEventSink>,
    ) -> Self {
        let state = spawn_state_actor(config.tail.buffer_capacity, Arc::clone(&events));
        let initial = RequestContext::new(SourceId::default())
            .with_filter_bots(config.analysis.filter_bots);
        let (context, context_rx) = watch::channel(initial);

        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&backend),
            state.clone(),
            Arc::clone(&events),
        ));
        let tail = TailSynchronizer::new(
            Arc::clone(&backend),
            state.clone(),
            Arc::clone(&reconciler),
            context_rx,
            config.tail.poll_interval,
        );
        let enrichment = EnrichmentScheduler::new(
            Arc::clone(&backend),
            geo,
            state.clone(),
            Arc::clone(&events),
            config.enrichment.request_spacing,
        );

        Self {
            backend,
            events,
            state,
            context,
            reconciler,
            tail,
            enrichment,
        }
    }

    // ── Request context ──

    /// The context a new operation would capture right now.
    pub fn context(&self) -> RequestContext {
        self.context.borrow().clone()
    }

    pub fn select_source(&self, source: impl Into<SourceId>) {
        let source = source.into();
        debug!(%source, "source selected");
        self.context.send_modify(|ctx| ctx.source = source);
    }

    pub fn set_filter_bots(&self, filter_bots: bool) {
        self.context.send_modify(|ctx| ctx.filter_bots = filter_bots);
    }

    pub fn set_date_range(&self, date_range: DateRange) {
        self.context.send_modify(|ctx| ctx.date_range = date_range);
    }

    // ── Reconciliation ──

    /// Interactive analysis of the current context.
    pub async fn analyze(&self) -> Result<u64, ClientError> {
        self.reconciler
            .reconcile(ReconcileMode::Interactive, self.context())
            .await
    }

    // ── Live tail ──

    pub async fn start_tailing(&self) -> Result<bool, ClientError> {
        self.tail.start(&self.context()).await
    }

    pub async fn stop_tailing(&self) -> Result<bool, ClientError> {
        self.tail.stop().await
    }

    pub async fn clear_tail(&self) -> Result<(), ClientError> {
        self.state.clear_tail().await
    }

    pub fn tail(&self) -> &TailSynchronizer {
        &self.tail
    }

    // ── Enrichment ──

    pub async fn resolve_one(&self, slot: usize) -> Result<ResolutionRecord, ClientError> {
        self.enrichment.resolve_one(slot).await
    }

    pub async fn resolve_all(&self) -> Result<ResolveAllReport, ClientError> {
        self.enrichment.resolve_all().await
    }

    pub fn enrichment(&self) -> &EnrichmentScheduler {
        &self.enrichment
    }

    // ── Lookups ──

    /// Requests made by `client` in the current source. The snapshot is
    /// never touched.
    pub async fn client_history(&self, client: &str) -> Result<Vec<HistoryEntry>, ClientError> {
        let source = self.context().source;
        let result = if source.is_empty() {
            Err(ClientError::NoSource)
        } else {
            self.backend
                .client_history(&source, client)
                .await
                .map_err(ClientError::from)
        };
        self.surface(Operation::ClientHistory, result)
    }

    /// Directory listing for choosing a source, directories first.
    pub async fn browse(&self, path: Option<&str>) -> Result<BrowseListing, ClientError> {
        let result = self
            .backend
            .browse(path)
            .await
            .map(|mut listing| {
                listing.sort_items();
                listing
            })
            .map_err(ClientError::from);
        self.surface(Operation::Browse, result)
    }

    pub async fn view(&self) -> Result<DisplayView, ClientError> {
        self.state.view().await
    }

    /// Stop tailing, if active.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.tail.stop().await.map(|_| ())
    }

    fn surface<T>(
        &self,
        operation: Operation,
        result: Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        if let Err(err) = &result {
            warn!(%operation, error = %err, "request failed");
            self.events.emit(ViewEventKind::ErrorSurfaced {
                operation,
                message: err.to_string(),
            });
        }
        result
    }
}
