//! Read-only room listing over HTTP

use std::collections::BTreeMap;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::signaling::{MemberId, RoomId, RoomManagerHandle};

/// `GET /rooms` -> `{ "<roomId>": ["<memberId>", ...] }`
pub fn router(handle: RoomManagerHandle) -> Router {
    Router::new()
        .route("/rooms", get(list_rooms))
        .layer(CorsLayer::permissive())
        .with_state(handle)
}

async fn list_rooms(
    State(handle): State<RoomManagerHandle>,
) -> Result<Json<BTreeMap<RoomId, Vec<MemberId>>>, StatusCode> {
    handle.list_rooms().await.map(Json).map_err(|e| {
        warn!("Room listing failed: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })
}

pub async fn run(addr: &str, handle: RoomManagerHandle) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Diagnostics listening on {}", addr);
    axum::serve(listener, router(handle)).await
}
