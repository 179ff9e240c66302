#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Facade operations: context handling, history, source selection.

use std::sync::Arc;

use chrono::NaiveDate;
use logdash_client::error::{BackendError, ClientError};
use logdash_client::event::{InMemoryEventSink, Operation, ViewEventKind};
use logdash_client::mock::{test_summary, MockBackend, MockCall};
use logdash_client::types::{BrowseItem, BrowseListing, HistoryEntry};
use logdash_client::Dashboard;
use logdash_core::config::Config;
use logdash_core::context::{DateRange, RequestContext};

const SOURCE: &str = "/var/log/nginx/access.log";

fn dashboard(backend: &Arc<MockBackend>) -> (Dashboard, Arc<InMemoryEventSink>) {
    let sink = Arc::new(InMemoryEventSink::new());
    let dashboard = Dashboard::new(&Config::default(), backend.clone(), None, sink.clone());
    (dashboard, sink)
}

fn entry(time: &str, request: &str, status: u16) -> HistoryEntry {
    HistoryEntry {
        time: time.into(),
        request: request.into(),
        status,
        referer: String::new(),
    }
}

// ── Context ──

#[tokio::test]
async fn context_setters_compose() {
    let backend = Arc::new(MockBackend::new());
    let (dashboard, _sink) = dashboard(&backend);

    let range = DateRange::new(NaiveDate::from_ymd_opt(2026, 1, 1), NaiveDate::from_ymd_opt(2026, 1, 31))
        .unwrap();
    dashboard.select_source(SOURCE);
    dashboard.set_filter_bots(true);
    dashboard.set_date_range(range);

    assert_eq!(
        dashboard.context(),
        RequestContext::new(SOURCE)
            .with_filter_bots(true)
            .with_date_range(range)
    );
}

#[tokio::test]
async fn configured_bot_filter_is_the_default() {
    let backend = Arc::new(MockBackend::new());
    let mut config = Config::default();
    config.analysis.filter_bots = true;
    let dashboard = Dashboard::new(
        &config,
        backend.clone(),
        None,
        Arc::new(InMemoryEventSink::new()),
    );
    assert!(dashboard.context().filter_bots);
}

#[tokio::test]
async fn view_reflects_loaded_snapshot() {
    let backend = Arc::new(MockBackend::new().with_summary(test_summary(77, &["8.8.8.8", "10.0.0.1"])));
    let (dashboard, _sink) = dashboard(&backend);

    let empty = dashboard.view().await.unwrap();
    assert_eq!(empty.generation, 0);
    assert!(empty.summary.is_none());

    dashboard.select_source(SOURCE);
    dashboard.analyze().await.unwrap();
    let view = dashboard.view().await.unwrap();
    assert_eq!(view.generation, 1);
    assert_eq!(view.entities.len(), 2);
    assert_eq!(view.entities[1].identifier, "10.0.0.1");
    assert_eq!(view.context.unwrap().source.as_str(), SOURCE);
}

// ── History ──

#[tokio::test]
async fn history_uses_current_source() {
    let backend = Arc::new(MockBackend::new().with_history(
        "8.8.8.8",
        vec![
            entry("21/Jan/2026:13:14:04", "GET / HTTP/1.1", 200),
            entry("21/Jan/2026:13:14:09", "GET /admin HTTP/1.1", 403),
        ],
    ));
    let (dashboard, _sink) = dashboard(&backend);
    dashboard.select_source(SOURCE);

    let entries = dashboard.client_history("8.8.8.8").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].status, 403);
    assert_eq!(
        backend.calls(),
        vec![MockCall::ClientHistory {
            source: SOURCE.into(),
            client: "8.8.8.8".into()
        }]
    );

    assert!(dashboard.client_history("1.2.3.4").await.unwrap().is_empty());
}

#[tokio::test]
async fn history_failure_is_surfaced_without_touching_snapshot() {
    let backend = Arc::new(
        MockBackend::new()
            .with_summary(test_summary(9, &["8.8.8.8"]))
            .with_history_error(BackendError::Transport {
                message: "connection reset".into(),
            }),
    );
    let (dashboard, sink) = dashboard(&backend);
    dashboard.select_source(SOURCE);
    dashboard.analyze().await.unwrap();

    assert!(dashboard.client_history("8.8.8.8").await.is_err());
    assert_eq!(dashboard.view().await.unwrap().generation, 1);
    assert!(sink.kinds().iter().any(|k| matches!(
        k,
        ViewEventKind::ErrorSurfaced {
            operation: Operation::ClientHistory,
            ..
        }
    )));
}

#[tokio::test]
async fn history_requires_a_source() {
    let backend = Arc::new(MockBackend::new());
    let (dashboard, _sink) = dashboard(&backend);
    assert_eq!(
        dashboard.client_history("8.8.8.8").await.unwrap_err(),
        ClientError::NoSource
    );
    assert!(backend.calls().is_empty());
}

// ── Browse ──

#[tokio::test]
async fn browse_sorts_directories_first() {
    let item = |name: &str, is_dir: bool| BrowseItem {
        name: name.into(),
        is_dir,
        path: format!("/var/log/{name}"),
    };
    let listing = BrowseListing {
        current_path: "/var/log".into(),
        parent_path: "/var".into(),
        items: vec![item("syslog", false), item("nginx", true), item("Apache2", true)],
    };
    let backend = Arc::new(MockBackend::new().with_listing(Ok(listing)));
    let (dashboard, _sink) = dashboard(&backend);

    let listing = dashboard.browse(Some("/var/log")).await.unwrap();
    let names: Vec<_> = listing.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Apache2", "nginx", "syslog"]);
    assert_eq!(backend.calls(), vec![MockCall::Browse(Some("/var/log".into()))]);
}

#[tokio::test]
async fn browse_failure_is_surfaced() {
    let backend = Arc::new(MockBackend::new().with_listing(Err(BackendError::Backend {
        status: 500,
        message: "Permission denied".into(),
    })));
    let (dashboard, sink) = dashboard(&backend);

    assert!(dashboard.browse(None).await.is_err());
    assert_eq!(
        sink.count_where(|k| matches!(
            k,
            ViewEventKind::ErrorSurfaced {
                operation: Operation::Browse,
                ..
            }
        )),
        1
    );
}
