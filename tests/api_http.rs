// tests/api_http.rs
//
// HTTP-level tests for the status Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use chrono::Utc;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt as _; // for `oneshot`

use status_monitor::api;
use status_monitor::health::{HealthState, Transition, Verdict};
use status_monitor::state::MonitorState;

const BODY_LIMIT: usize = 1024 * 1024;

async fn get(state: &MonitorState, uri: &str) -> (StatusCode, Vec<u8>) {
    let app = api::create_router(state.clone());
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

#[tokio::test]
async fn health_returns_200_and_ok_body() {
    let state = MonitorState::new("API", Utc::now(), None);
    let (status, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");
}

#[tokio::test]
async fn status_reflects_shared_state() {
    let state = MonitorState::new("Cursor AI", Utc::now(), Some("https://status.example.com/history.atom".into()));
    let now = Utc::now();
    let down = HealthState {
        verdict: Verdict::Down,
        success_streak: 0,
        fail_streak: 2,
        first_success_at: None,
    };
    state
        .record_health(
            &down,
            false,
            now,
            Some(&Transition::Down {
                at: now,
                fail_streak: 2,
            }),
        )
        .await;
    state.set_paused(true).await;

    let (status, body) = get(&state, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).expect("status json");

    assert_eq!(v["service"], "Cursor AI");
    assert_eq!(v["paused"], true);
    assert_eq!(v["health"]["verdict"], "down");
    assert_eq!(v["health"]["fail_streak"], 2);
    assert_eq!(v["health"]["checks_total"], 1);
    assert!(v["health"]["last_transition_at"].is_string());
    assert_eq!(v["feed"]["url"], "https://status.example.com/history.atom");
    assert!(v["feed"]["last_poll_at"].is_null());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let state = MonitorState::new("API", Utc::now(), None);
    let (status, _) = get(&state, "/analyze").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
