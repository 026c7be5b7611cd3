use crate::interface_adapters::http::error_response;
use crate::interface_adapters::state::AppState;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

/// `GET /lobbies`: the public lobby list, for services that do not hold a socket.
pub async fn list_lobbies_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.lobby_registry.summaries() {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to list lobbies");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "lobby store unavailable")
        }
    }
}
