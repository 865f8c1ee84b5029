use shuttle_axum::axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::CorsLayer;

use crate::state::{MonitorState, StatusSnapshot};

/// HTTP surface: liveness and a read-only status snapshot.
/// `/metrics` is merged in by the caller when a recorder is installed.
pub fn create_router(state: MonitorState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn status(State(state): State<MonitorState>) -> Json<StatusSnapshot> {
    Json(state.snapshot().await)
}
