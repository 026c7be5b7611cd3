// Shared server bootstrap and websocket helpers for integration tests.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use resistance_server::domain::ports::IdentityProvider;
use resistance_server::interface_adapters::clients::GuestIdentity;
use resistance_server::use_cases::{LobbySettings, PhaseTimeouts};
use serde_json::Value;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Base URL published once the server thread has bound its port.
static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts the shared test server (guest identities) and returns its base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // The server gets its own thread and runtime so it outlives each `#[tokio::test]`.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{}", addr));

                let settings = LobbySettings {
                    timeouts: PhaseTimeouts {
                        propose: Duration::from_secs(30),
                        vote: Duration::from_secs(30),
                        decide: Duration::from_secs(30),
                    },
                    ..LobbySettings::default()
                };
                let identity: Arc<dyn IdentityProvider> = Arc::new(GuestIdentity);
                let state = resistance_server::app_state(settings, identity).expect("app state");
                resistance_server::serve(listener, state)
                    .await
                    .expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    // Retry for a short period to avoid racing server bind/accept.
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

pub fn ws_url(token: Option<&str>) -> String {
    let base = ensure_server().replacen("http://", "ws://", 1);
    match token {
        Some(token) => format!("{base}/ws?token={token}"),
        None => format!("{base}/ws"),
    }
}

/// Connects as the guest participant `id`.
pub async fn connect(id: &str) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(ws_url(Some(id)))
        .await
        .expect("websocket upgrade");
    socket
}

pub async fn send(socket: &mut Socket, group: &str, name: &str, body: Value) {
    let frame = serde_json::json!({ "group": group, "name": name, "body": body });
    socket
        .send(Message::text(frame.to_string()))
        .await
        .expect("send frame");
}

/// Reads frames until `group.name` arrives and returns its body. Other
/// messages (lobby list refreshes and the like) are skipped.
pub async fn expect_message(socket: &mut Socket, group: &str, name: &str) -> Value {
    loop {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, socket.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {group}.{name}"))
            .expect("socket closed")
            .expect("read frame");
        let Message::Text(text) = frame else {
            continue;
        };
        let envelope: Value = serde_json::from_str(text.as_str()).expect("json envelope");
        if envelope["group"] == group && envelope["name"] == name {
            return envelope["body"].clone();
        }
    }
}

/// Waits for a `lobby.get` roster with `count` clients.
pub async fn expect_roster(socket: &mut Socket, count: usize) -> Value {
    loop {
        let roster = expect_message(socket, "lobby", "get").await;
        if roster["clients"].as_array().map(Vec::len) == Some(count) {
            return roster;
        }
    }
}

/// True once the server closes the socket.
pub async fn closed_by_server(socket: &mut Socket) -> bool {
    loop {
        match tokio::time::timeout(FRAME_TIMEOUT, socket.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
        }
    }
}
