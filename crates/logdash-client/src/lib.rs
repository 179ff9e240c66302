//! logdash-client: the dashboard client runtime.
//!
//! Three timelines share one display state:
//! - `tail::TailSynchronizer` follows a growing log source and refreshes
//!   the summary silently when new lines arrive,
//! - `reconcile::Reconciler` replaces the summary snapshot on demand,
//! - `enrich::EnrichmentScheduler` resolves names and regions for the
//!   ranked clients, one at a time.
//!
//! The backend is reached through the `DashboardBackend` and `GeoLocator`
//! traits, with `http` transports for real use and `mock` for tests.

pub mod buffer;
pub mod cli;
pub mod dashboard;
pub mod enrich;
pub mod error;
pub mod event;
pub mod http;
pub mod logging;
pub mod mock;
pub mod reconcile;
pub mod report;
pub mod service;
pub mod state;
pub mod tail;
pub mod types;

pub use dashboard::Dashboard;

/// Stable crate label used for smoke tests.
pub fn crate_label() -> &'static str {
    "logdash-client"
}
