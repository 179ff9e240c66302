#![allow(clippy::expect_used, clippy::unwrap_used)]

//! End-to-end command runs against the mock backend.

use std::sync::Arc;

use logdash_client::cli::run_for_test;
use logdash_client::error::BackendError;
use logdash_client::mock::{test_summary, MockBackend, MockCall, MockGeoLocator};
use logdash_client::service::{DashboardBackend, GeoLocator};
use logdash_client::types::HistoryEntry;
use logdash_core::config::Config;
use logdash_core::context::RequestContext;

fn config() -> Config {
    let mut config = Config::default();
    config.enrichment.request_spacing = std::time::Duration::ZERO;
    config
}

// ── analyze ──

#[test]
fn analyze_prints_report() {
    let backend = Arc::new(MockBackend::new().with_summary(test_summary(250, &["8.8.8.8"])));
    let out = run_for_test(
        &["analyze", "/var/log/nginx/access.log"],
        &config(),
        backend.clone(),
        None,
    );

    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("Total requests"));
    assert!(out.stdout.contains("250"));
    assert!(out.stdout.contains("8.8.8.8"));
    assert_eq!(
        backend.calls(),
        vec![MockCall::Analyze(RequestContext::new(
            "/var/log/nginx/access.log"
        ))]
    );
}

#[test]
fn analyze_passes_filters() {
    let backend = Arc::new(MockBackend::new());
    let out = run_for_test(
        &[
            "analyze",
            "access.log",
            "--exclude-bots",
            "--from",
            "2026-01-01",
            "--to",
            "2026-01-31",
            "--json",
        ],
        &config(),
        backend.clone(),
        None,
    );

    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("\"total_requests\""));
    let calls = backend.calls();
    let MockCall::Analyze(context) = &calls[0] else {
        panic!("expected analyze call");
    };
    assert!(context.filter_bots);
    assert_eq!(context.date_range.start.unwrap().to_string(), "2026-01-01");
    assert_eq!(context.date_range.end.unwrap().to_string(), "2026-01-31");
}

#[test]
fn analyze_rejects_inverted_dates() {
    let backend = Arc::new(MockBackend::new());
    let out = run_for_test(
        &["analyze", "access.log", "--from", "2026-02-01", "--to", "2026-01-01"],
        &config(),
        backend.clone(),
        None,
    );
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("after"));
    assert!(backend.calls().is_empty());
}

#[test]
fn analyze_with_resolve_fills_client_table() {
    let backend = Arc::new(
        MockBackend::new()
            .with_summary(test_summary(10, &["8.8.8.8", "10.1.2.3"]))
            .with_name("8.8.8.8", "dns.google"),
    );
    let geo: Arc<dyn GeoLocator> =
        Arc::new(MockGeoLocator::new().with_location("8.8.8.8", "United States", "US"));
    let out = run_for_test(
        &["analyze", "access.log", "--resolve"],
        &config(),
        backend,
        Some(geo),
    );

    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("[US] dns.google"));
    assert!(out.stdout.contains("[local] ?"));
}

#[test]
fn backend_failure_exits_nonzero() {
    let backend = MockBackend::new();
    backend.push_analyze(
        std::time::Duration::ZERO,
        Err(BackendError::Backend {
            status: 404,
            message: "File not found".into(),
        }),
    );
    let backend: Arc<dyn DashboardBackend> = Arc::new(backend);
    let out = run_for_test(&["analyze", "missing.log"], &config(), backend, None);

    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("File not found"));
}

// ── other commands ──

#[test]
fn history_prints_entries() {
    let backend = Arc::new(MockBackend::new().with_history(
        "8.8.8.8",
        vec![HistoryEntry {
            time: "21/Jan/2026:13:14:04".into(),
            request: "GET /login HTTP/1.1".into(),
            status: 401,
            referer: String::new(),
        }],
    ));
    let out = run_for_test(&["history", "access.log", "8.8.8.8"], &config(), backend, None);

    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("GET /login HTTP/1.1"));
    assert!(out.stdout.contains("401"));
}

#[test]
fn browse_prints_listing() {
    let backend = Arc::new(MockBackend::new());
    let out = run_for_test(&["browse"], &config(), backend.clone(), None);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert_eq!(backend.calls(), vec![MockCall::Browse(None)]);
}

#[test]
fn unknown_command_is_a_usage_error() {
    let out = run_for_test(&["frobnicate"], &config(), Arc::new(MockBackend::new()), None);
    assert_eq!(out.exit_code, 2);
    assert!(!out.stderr.is_empty());
}

#[test]
fn help_goes_to_stdout() {
    let out = run_for_test(&["--help"], &config(), Arc::new(MockBackend::new()), None);
    assert_eq!(out.exit_code, 0);
    assert!(out.stdout.contains("analyze"));
}
