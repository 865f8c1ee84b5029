// tests/metrics.rs
//
// One test per process: the Prometheus recorder is global.
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use status_monitor::config::{FeedConfig, MonitorConfig};
use status_monitor::feed::cursor::CursorStore;
use status_monitor::feed::engine::FeedEngine;
use status_monitor::feed::runner::FeedMonitor;
use status_monitor::feed::source::StaticFeed;
use status_monitor::format::MessageFormatter;
use status_monitor::metrics::Metrics;
use status_monitor::notify::NotifierMux;
use status_monitor::state::MonitorState;

#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let m = Metrics::init(&MonitorConfig::default()).expect("recorder installs once");

    // drive one feed cycle so the feed counters exist
    let dir = tempfile::tempdir().unwrap();
    let cfg = FeedConfig::default();
    let feed = FeedMonitor::new(
        Arc::new(StaticFeed::from_fixture(include_str!("fixtures/rss.xml"))),
        CursorStore::new(dir.path().join("state.json")),
        FeedEngine::from_config(&cfg, Utc::now(), MessageFormatter::default()),
        Arc::new(NotifierMux::new(vec![])),
        MonitorState::new("Test", Utc::now(), None),
        Duration::from_secs(cfg.poll_secs),
    );
    feed.poll_once(Utc::now()).await.unwrap();

    let resp = m
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "health_interval_seconds",
        "feed_cooldown_seconds",
        "feed_polls_total",
        "feed_last_poll_ts",
        "feed_notifications_total",
    ] {
        assert!(text.contains(needle), "missing series {needle} in:\n{text}");
    }
}
