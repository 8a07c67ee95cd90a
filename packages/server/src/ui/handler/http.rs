//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    domain::RoomId,
    infrastructure::dto::{http::HealthResponse, websocket::OnlineStatusDto},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.gateway.health().await)
}

/// Current online status of a room
pub async fn get_room_presence(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<i64>,
) -> Json<OnlineStatusDto> {
    Json(state.gateway.room_presence(RoomId::new(room_id)).await)
}
