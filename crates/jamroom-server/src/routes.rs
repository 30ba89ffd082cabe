//! HTTP surface: the listening-room page, the WebSocket upgrade, and the
//! operational endpoints.

use axum::Router;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::ws;

/// The embedded listening-room page (player UI + WebSocket client).
const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws/{username}", get(ws_upgrade))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Path(username): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade
        .on_upgrade(move |socket| ws::serve_connection(state, socket, username))
        .into_response()
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.hub.session_count(),
        "backlog": state.hub.backlog_len(),
    }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state.metrics.render()
}
