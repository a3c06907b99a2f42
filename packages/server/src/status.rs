//! Read-only HTTP status endpoint.

use std::{io, sync::Arc};

use axum::{Json, Router, extract::State, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::hub::{Hub, RoomStatus};

/// Build the status router.
///
/// * `GET /api/health` - liveness probe
/// * `GET /api/room` - connected clients and chat log length
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/room", get(room_status))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

/// Serve the status router on an already bound listener.
pub async fn serve(listener: TcpListener, hub: Arc<Hub>) -> io::Result<()> {
    axum::serve(listener, router(hub)).await
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Current room membership
pub async fn room_status(State(hub): State<Arc<Hub>>) -> Json<RoomStatus> {
    Json(hub.status().await)
}
