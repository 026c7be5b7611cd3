use crate::domain::Identity;
use crate::domain::errors::IdentityError;
use crate::interface_adapters::http::error_response;
use crate::interface_adapters::net::pump::{read_loop, write_loop};
use crate::interface_adapters::net::session::{install_session_commands, send_lobby_list};
use crate::interface_adapters::protocol::{
    CMD_GET, ConnectQuery, Envelope, GROUP_CLIENT, GROUP_LOBBIES,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{Connection, ConnectionRegistry, LobbyRegistry};

use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let token = query.token.unwrap_or_default();
    let identity = match state.identity.verify(&token).await {
        Ok(identity) => identity,
        Err(error @ IdentityError::InvalidToken) => {
            return reject(StatusCode::UNAUTHORIZED, &error);
        }
        Err(error @ IdentityError::UpstreamUnavailable) => {
            warn!("identity provider unavailable; refusing upgrade");
            return reject(StatusCode::SERVICE_UNAVAILABLE, &error);
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

fn reject(status: StatusCode, error: &IdentityError) -> Response {
    error_response(status, error.to_string())
}

async fn handle_socket(socket: WebSocket, identity: Identity, state: Arc<AppState>) {
    let (conn, outbound_rx) = Connection::new(identity);
    let span = info_span!("conn", conn_id = conn.conn_id(), player_id = %conn.id());

    async move {
        // Replaces (and waits out) an older connection for the same participant.
        state.connections.register(&conn).await;
        info!(display_name = %conn.identity().display_name, "client connected");

        install_session_commands(&conn, &state.lobby_registry);
        if let Err(error) = conn.write_message(GROUP_CLIENT, CMD_GET, conn.identity()) {
            warn!(%error, "failed to send identity");
        }
        if let Err(error) = send_lobby_list(&conn, &state.lobby_registry) {
            warn!(%error, "failed to send lobby list");
        }

        let (sink, stream) = socket.split();
        let writer = tokio::spawn(write_loop(sink, outbound_rx, conn.clone()).instrument(Span::current()));
        read_loop(stream, conn.clone()).await;

        conn.destroy();
        if let Err(error) = writer.await {
            error!(%error, "writer task failed");
        }
        info!("client disconnected");
    }
    .instrument(span)
    .await
}

/// Re-broadcasts the public lobby list to every live connection whenever the
/// registry reports a change. Bursts of changes collapse into one broadcast.
pub async fn lobby_list_broadcaster(
    mut changes: watch::Receiver<u64>,
    lobby_registry: Arc<LobbyRegistry>,
    connections: Arc<ConnectionRegistry>,
) {
    while changes.changed().await.is_ok() {
        let summaries = match lobby_registry.summaries() {
            Ok(summaries) => summaries,
            Err(error) => {
                error!(%error, "failed to list lobbies");
                continue;
            }
        };
        // Serialize once and share the bytes with every connection.
        let bytes = match Envelope::new(GROUP_LOBBIES, CMD_GET, summaries).encode() {
            Ok(bytes) => bytes,
            Err(error) => {
                error!(%error, "failed to serialize lobby list");
                continue;
            }
        };

        for conn in connections.all().await {
            conn.write_bytes(bytes.clone());
        }
    }
    debug!("lobby registry gone; lobby list broadcaster exiting");
}

pub fn spawn_lobby_list_broadcaster(
    lobby_registry: &Arc<LobbyRegistry>,
    connections: &Arc<ConnectionRegistry>,
) {
    tokio::spawn(lobby_list_broadcaster(
        lobby_registry.changes(),
        lobby_registry.clone(),
        connections.clone(),
    ));
}
