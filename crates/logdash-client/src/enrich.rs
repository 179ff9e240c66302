//! Per-client metadata resolution.
//!
//! Resolution runs as a concurrency-1 queue: one client at a time, with a
//! fixed minimum delay between lookups so the third-party geolocation
//! service's rate limit is respected. Only one resolve-all batch may run at
//! a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use logdash_core::address;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::event::{Operation, ViewEventKind, ViewEventSink};
use crate::service::{DashboardBackend, GeoLocator};
use crate::state::{
    BeginResolve, DashboardHandle, Region, ResolutionRecord, ResolutionState, ResolveMode,
};

/// How a resolve-all call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every slot was visited.
    Completed,
    /// Another batch was already running; nothing was done.
    AlreadyRunning,
    /// The snapshot was replaced mid-batch.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveAllReport {
    pub outcome: BatchOutcome,
    pub resolved: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ResolveAllReport {
    fn new(outcome: BatchOutcome) -> Self {
        Self {
            outcome,
            resolved: 0,
            failed: 0,
            skipped: 0,
        }
    }

    /// Number of lookups actually performed.
    pub fn performed(&self) -> usize {
        self.resolved + self.failed
    }
}

pub struct EnrichmentScheduler {
    backend: Arc<dyn DashboardBackend>,
    geo: Option<Arc<dyn GeoLocator>>,
    state: DashboardHandle,
    events: Arc<dyn ViewEventSink>,
    spacing: Duration,
    busy: AtomicBool,
}

/// Clears the busy flag and re-enables the control when a batch ends.
struct BatchGuard<'a> {
    busy: &'a AtomicBool,
    events: &'a dyn ViewEventSink,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        self.events.emit(ViewEventKind::ResolveControl { enabled: true });
    }
}

impl EnrichmentScheduler {
    /// `geo: None` disables geolocation; local addresses are still marked.
    pub fn new(
        backend: Arc<dyn DashboardBackend>,
        geo: Option<Arc<dyn GeoLocator>>,
        state: DashboardHandle,
        events: Arc<dyn ViewEventSink>,
        spacing: Duration,
    ) -> Self {
        Self {
            backend,
            geo,
            state,
            events,
            spacing,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Resolve one ranked client on explicit request.
    ///
    /// Re-issues resolved and failed records, but refuses one that is
    /// already in flight. A lookup that yields nothing is surfaced.
    pub async fn resolve_one(&self, slot: usize) -> Result<ResolutionRecord, ClientError> {
        let (generation, identifier) =
            match self.state.begin_resolve(None, slot, ResolveMode::Explicit).await? {
                BeginResolve::Started {
                    generation,
                    identifier,
                } => (generation, identifier),
                BeginResolve::Skipped { identifier, .. } => {
                    return Err(ClientError::AlreadyInFlight { identifier })
                }
                BeginResolve::Stale => return Err(ClientError::StaleSnapshot),
                BeginResolve::UnknownSlot => return Err(ClientError::UnknownSlot { slot }),
                BeginResolve::NoSnapshot => return Err(ClientError::NoSnapshot),
            };

        let record = self.lookup(&identifier).await;
        if !self
            .state
            .finish_resolve(generation, slot, record.clone())
            .await?
        {
            return Err(ClientError::StaleSnapshot);
        }
        if record.state == ResolutionState::Failed {
            self.events.emit(ViewEventKind::ErrorSurfaced {
                operation: Operation::ResolveClient,
                message: format!("no metadata found for {identifier}"),
            });
        }
        Ok(record)
    }

    /// Resolve every ranked client not yet resolved, in rank order.
    pub async fn resolve_all(&self) -> Result<ResolveAllReport, ClientError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("resolve-all already running");
            return Ok(ResolveAllReport::new(BatchOutcome::AlreadyRunning));
        }
        self.events.emit(ViewEventKind::ResolveControl { enabled: false });
        let _guard = BatchGuard {
            busy: &self.busy,
            events: self.events.as_ref(),
        };

        let Some(ranking) = self.state.ranking().await? else {
            return Err(ClientError::NoSnapshot);
        };
        let generation = ranking.generation;
        let mut report = ResolveAllReport::new(BatchOutcome::Completed);

        for (slot, identifier) in ranking.identifiers.iter().enumerate() {
            match self.state.record_state(generation, slot).await? {
                None => {
                    report.outcome = BatchOutcome::Interrupted;
                    break;
                }
                Some(ResolutionState::Resolved | ResolutionState::InFlight) => {
                    report.skipped += 1;
                    continue;
                }
                Some(ResolutionState::Unresolved | ResolutionState::Failed) => {}
            }

            if report.performed() > 0 && !self.spacing.is_zero() {
                tokio::time::sleep(self.spacing).await;
            }

            match self
                .state
                .begin_resolve(Some(generation), slot, ResolveMode::Bulk)
                .await?
            {
                BeginResolve::Started { .. } => {}
                BeginResolve::Skipped { .. } => {
                    report.skipped += 1;
                    continue;
                }
                BeginResolve::Stale | BeginResolve::UnknownSlot | BeginResolve::NoSnapshot => {
                    report.outcome = BatchOutcome::Interrupted;
                    break;
                }
            }

            let record = self.lookup(identifier).await;
            let failed = record.state == ResolutionState::Failed;
            if !self.state.finish_resolve(generation, slot, record).await? {
                report.outcome = BatchOutcome::Interrupted;
                break;
            }
            if failed {
                report.failed += 1;
            } else {
                report.resolved += 1;
            }
        }

        if report.outcome == BatchOutcome::Interrupted {
            info!(generation, "resolve-all stopped: snapshot replaced");
        } else {
            info!(
                resolved = report.resolved,
                failed = report.failed,
                skipped = report.skipped,
                "resolve-all finished"
            );
        }
        Ok(report)
    }

    /// Run the name and region lookups concurrently and merge them.
    async fn lookup(&self, identifier: &str) -> ResolutionRecord {
        let local = address::is_local(identifier);

        let name = async {
            match self.backend.reverse_lookup(identifier).await {
                Ok(name) => name.filter(|n| !n.trim().is_empty()),
                Err(err) => {
                    debug!(identifier, error = %err, "reverse lookup failed");
                    None
                }
            }
        };
        let region = async {
            if local {
                return Some(Region::LocalOrigin);
            }
            let geo = self.geo.as_ref()?;
            match geo.locate(identifier).await {
                Ok(location) => Some(Region::Country {
                    name: location.country_name,
                    code: location.country_code,
                }),
                Err(err) => {
                    debug!(identifier, error = %err, "geolocation failed");
                    None
                }
            }
        };

        let (name, region) = tokio::join!(name, region);
        if name.is_none() && region.is_none() {
            warn!(identifier, "client resolution failed");
            ResolutionRecord::failed()
        } else {
            ResolutionRecord::resolved(name, region)
        }
    }
}
