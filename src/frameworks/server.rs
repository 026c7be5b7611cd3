// Framework bootstrap for the game server runtime.

use crate::domain::errors::RegistryError;
use crate::domain::ports::IdentityProvider;
use crate::frameworks::config::{self, IdentityMode};
use crate::frameworks::store::MemoryStore;
use crate::interface_adapters::clients::{GuestIdentity, IdentityClient};
use crate::interface_adapters::net::{list_lobbies_handler, spawn_lobby_list_broadcaster, ws_handler};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{ConnectionRegistry, LobbyRegistry, LobbySettings};

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Serves with state built from the environment.
pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let state = build_state()?;
    serve(listener, state).await
}

pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> Result<()> {
    let address = listener.local_addr()?;

    // Keep every connected client's lobby list current.
    spawn_lobby_list_broadcaster(&state.lobby_registry, &state.connections);
    let app = router(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/lobbies", get(list_lobbies_handler))
        .with_state(state)
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

/// Wires the registries around `identity`, with lobbies kept in memory.
pub fn app_state(
    settings: LobbySettings,
    identity: Arc<dyn IdentityProvider>,
) -> std::result::Result<Arc<AppState>, RegistryError> {
    let lobby_registry = LobbyRegistry::new(settings, Arc::new(MemoryStore::new()))?;
    Ok(Arc::new(AppState {
        lobby_registry,
        connections: Arc::new(ConnectionRegistry::new()),
        identity,
    }))
}

fn build_state() -> Result<Arc<AppState>> {
    let settings = config::lobby_settings().map_err(|e| {
        tracing::error!(error = %e, "invalid lobby configuration");
        std::io::Error::other(format!("invalid lobby configuration: {e}"))
    })?;
    tracing::debug!(
        id_len = settings.id_len,
        max_clients = settings.max_clients,
        propose_secs = settings.timeouts.propose.as_secs(),
        vote_secs = settings.timeouts.vote.as_secs(),
        decide_secs = settings.timeouts.decide.as_secs(),
        "lobby settings loaded"
    );

    let mode = config::identity_mode()
        .map_err(|e| std::io::Error::other(format!("invalid identity configuration: {e}")))?;
    let identity: Arc<dyn IdentityProvider> = match mode {
        IdentityMode::Guest => {
            tracing::warn!("guest identity mode: tokens are trusted as participant ids");
            Arc::new(GuestIdentity)
        }
        IdentityMode::Service => {
            let base_url = config::identity_service_url();
            let verify_timeout = config::identity_verify_timeout();
            let client = IdentityClient::new(base_url.clone(), verify_timeout).map_err(|e| {
                std::io::Error::other(format!("failed to initialize identity client: {e}"))
            })?;
            tracing::debug!(
                identity_base_url = %base_url,
                identity_verify_timeout_ms = verify_timeout.as_millis(),
                "identity client configured"
            );
            Arc::new(client)
        }
    };

    app_state(settings, identity).map_err(|e| std::io::Error::other(e.to_string()))
}
