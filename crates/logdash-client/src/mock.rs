//! Mock backend and geolocator for unit testing.
//!
//! Both record every call and return pre-configured responses, so tests
//! can assert on exactly which requests the engine issued.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use logdash_core::context::{RequestContext, SourceId};
use logdash_core::summary::{AnalysisSummary, RankedEntry};

use crate::error::{BackendError, GeoError};
use crate::service::{DashboardBackend, GeoLocator};
use crate::types::{BrowseListing, GeoLocation, HistoryEntry, TailBatch, TailCursor};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A recorded call to the mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Analyze(RequestContext),
    Tail { source: SourceId, cursor: TailCursor },
    ClientHistory { source: SourceId, client: String },
    ReverseLookup(String),
    Browse(Option<String>),
}

type Scripted<T> = (Duration, Result<T, BackendError>);

/// Mock implementation of `DashboardBackend` for testing.
pub struct MockBackend {
    calls: Mutex<Vec<MockCall>>,
    summary: Mutex<AnalysisSummary>,
    analyze_script: Mutex<VecDeque<Scripted<AnalysisSummary>>>,
    tail_script: Mutex<VecDeque<Scripted<TailBatch>>>,
    source_end: Mutex<u64>,
    names: Mutex<HashMap<String, Result<Option<String>, BackendError>>>,
    history: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    history_error: Mutex<Option<BackendError>>,
    listing: Mutex<Result<BrowseListing, BackendError>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            summary: Mutex::new(AnalysisSummary::default()),
            analyze_script: Mutex::new(VecDeque::new()),
            tail_script: Mutex::new(VecDeque::new()),
            source_end: Mutex::new(0),
            names: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            history_error: Mutex::new(None),
            listing: Mutex::new(Ok(BrowseListing::default())),
        }
    }

    /// Summary returned by `analyze` once the script is exhausted.
    pub fn with_summary(self, summary: AnalysisSummary) -> Self {
        *lock(&self.summary) = summary;
        self
    }

    /// Queue the next `analyze` result, delivered after `delay`.
    pub fn push_analyze(&self, delay: Duration, result: Result<AnalysisSummary, BackendError>) {
        lock(&self.analyze_script).push_back((delay, result));
    }

    /// Queue the next `tail` result, delivered after `delay`.
    pub fn push_tail(&self, delay: Duration, result: Result<TailBatch, BackendError>) {
        lock(&self.tail_script).push_back((delay, result));
    }

    /// Offset an `End` cursor resolves to once the tail script is exhausted.
    pub fn with_source_end(self, offset: u64) -> Self {
        *lock(&self.source_end) = offset;
        self
    }

    pub fn with_name(self, client: &str, name: &str) -> Self {
        lock(&self.names).insert(client.to_string(), Ok(Some(name.to_string())));
        self
    }

    pub fn with_name_error(self, client: &str, err: BackendError) -> Self {
        lock(&self.names).insert(client.to_string(), Err(err));
        self
    }

    pub fn with_history(self, client: &str, entries: Vec<HistoryEntry>) -> Self {
        lock(&self.history).insert(client.to_string(), entries);
        self
    }

    pub fn with_history_error(self, err: BackendError) -> Self {
        *lock(&self.history_error) = Some(err);
        self
    }

    pub fn with_listing(self, listing: Result<BrowseListing, BackendError>) -> Self {
        *lock(&self.listing) = listing;
        self
    }

    /// Return all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| predicate(c)).count()
    }

    /// Cursors sent to `tail`, in order.
    pub fn tail_cursors(&self) -> Vec<TailCursor> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                MockCall::Tail { cursor, .. } => Some(*cursor),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }
}

async fn deliver<T>(scripted: Scripted<T>) -> Result<T, BackendError> {
    let (delay, result) = scripted;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    result
}

#[async_trait]
impl DashboardBackend for MockBackend {
    async fn analyze(&self, context: &RequestContext) -> Result<AnalysisSummary, BackendError> {
        self.record(MockCall::Analyze(context.clone()));
        let scripted = lock(&self.analyze_script).pop_front();
        match scripted {
            Some(scripted) => deliver(scripted).await,
            None => Ok(lock(&self.summary).clone()),
        }
    }

    async fn tail(
        &self,
        source: &SourceId,
        cursor: TailCursor,
    ) -> Result<TailBatch, BackendError> {
        self.record(MockCall::Tail {
            source: source.clone(),
            cursor,
        });
        let scripted = lock(&self.tail_script).pop_front();
        match scripted {
            Some(scripted) => deliver(scripted).await,
            None => {
                let end = cursor.offset().unwrap_or(*lock(&self.source_end));
                Ok(TailBatch::empty(end))
            }
        }
    }

    async fn client_history(
        &self,
        source: &SourceId,
        client: &str,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        self.record(MockCall::ClientHistory {
            source: source.clone(),
            client: client.to_string(),
        });
        if let Some(err) = lock(&self.history_error).clone() {
            return Err(err);
        }
        Ok(lock(&self.history).get(client).cloned().unwrap_or_default())
    }

    async fn reverse_lookup(&self, client: &str) -> Result<Option<String>, BackendError> {
        self.record(MockCall::ReverseLookup(client.to_string()));
        lock(&self.names).get(client).cloned().unwrap_or(Ok(None))
    }

    async fn browse(&self, path: Option<&str>) -> Result<BrowseListing, BackendError> {
        self.record(MockCall::Browse(path.map(str::to_string)));
        lock(&self.listing).clone()
    }
}

/// Mock implementation of `GeoLocator` for testing.
///
/// Unknown identifiers fail with `GeoError::NotFound`.
#[derive(Default)]
pub struct MockGeoLocator {
    calls: Mutex<Vec<String>>,
    results: Mutex<HashMap<String, Result<GeoLocation, GeoError>>>,
    delay: Mutex<Duration>,
}

impl MockGeoLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(self, client: &str, country_name: &str, country_code: &str) -> Self {
        lock(&self.results).insert(
            client.to_string(),
            Ok(GeoLocation::new(country_name, country_code)),
        );
        self
    }

    pub fn with_error(self, client: &str, err: GeoError) -> Self {
        lock(&self.results).insert(client.to_string(), Err(err));
        self
    }

    /// Delay every lookup by `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = delay;
        self
    }

    /// Identifiers looked up, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl GeoLocator for MockGeoLocator {
    async fn locate(&self, client: &str) -> Result<GeoLocation, GeoError> {
        lock(&self.calls).push(client.to_string());
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock(&self.results)
            .get(client)
            .cloned()
            .unwrap_or_else(|| {
                Err(GeoError::NotFound {
                    identifier: client.to_string(),
                })
            })
    }
}

/// Helper to create a summary whose ranked clients are `clients`.
pub fn test_summary(total_requests: u64, clients: &[&str]) -> AnalysisSummary {
    let count = clients.len() as u64;
    AnalysisSummary {
        total_requests,
        unique_clients: count,
        top_clients: clients
            .iter()
            .zip((1..=count).rev())
            .map(|(client, hits)| RankedEntry::new(*client, hits))
            .collect(),
        ..AnalysisSummary::default()
    }
}
