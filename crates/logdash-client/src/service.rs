//! Service traits for the backend collaborators.
//!
//! Implementations can talk HTTP to a running dashboard backend or be mocked
//! for testing. Every call has exactly two outcomes: a payload or an error.

use async_trait::async_trait;
use logdash_core::context::{RequestContext, SourceId};
use logdash_core::summary::AnalysisSummary;

use crate::error::{BackendError, GeoError};
use crate::types::{BrowseListing, GeoLocation, HistoryEntry, TailBatch, TailCursor};

/// The dashboard backend: analysis, tail, history, reverse lookup, browse.
#[async_trait]
pub trait DashboardBackend: Send + Sync {
    /// Aggregate summary for the context's source and filters.
    async fn analyze(&self, context: &RequestContext) -> Result<AnalysisSummary, BackendError>;

    /// Lines appended to `source` after `cursor`, plus the cursor to use next.
    async fn tail(&self, source: &SourceId, cursor: TailCursor)
        -> Result<TailBatch, BackendError>;

    /// Requests made by one client, in log order. Empty when none.
    async fn client_history(
        &self,
        source: &SourceId,
        client: &str,
    ) -> Result<Vec<HistoryEntry>, BackendError>;

    /// Reverse name for a client address; `None` when nothing resolves.
    async fn reverse_lookup(&self, client: &str) -> Result<Option<String>, BackendError>;

    /// List a directory (or the backend's default) to choose a source.
    async fn browse(&self, path: Option<&str>) -> Result<BrowseListing, BackendError>;
}

/// Third-party geolocation, independent of the dashboard backend.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, client: &str) -> Result<GeoLocation, GeoError>;
}
