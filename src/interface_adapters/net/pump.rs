// Socket pumps: one task feeds inbound frames into the command registry, the other
// drains the outbound queue onto the socket and keeps the connection alive.

use crate::use_cases::Connection;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Writer inactivity before a Ping is sent.
pub const PING_PERIOD: Duration = Duration::from_secs(54);
/// Reader silence (no frame, not even a Pong) before the peer is considered gone.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn read_loop(mut stream: SplitStream<WebSocket>, conn: Arc<Connection>) {
    let mut done = conn.get_done();

    loop {
        let incoming = tokio::select! {
            _ = &mut done => break,
            incoming = tokio::time::timeout(IDLE_TIMEOUT, stream.next()) => incoming,
        };

        match incoming {
            Ok(Some(Ok(Message::Text(text)))) => conn.dispatch(text.as_str()),
            Ok(Some(Ok(Message::Binary(bytes)))) => {
                debug!(bytes = bytes.len(), "binary frame dropped");
            }
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(Some(Ok(Message::Close(_)))) => {
                info!("client closed the socket");
                break;
            }
            Ok(Some(Err(error))) => {
                warn!(%error, "websocket recv error");
                break;
            }
            Ok(None) => {
                info!("websocket closed");
                break;
            }
            Err(_) => {
                info!(idle_secs = IDLE_TIMEOUT.as_secs(), "client went silent");
                break;
            }
        }
    }

    conn.destroy();
}

pub async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    conn: Arc<Connection>,
) {
    let mut done = conn.get_done();
    let mut keepalive = tokio::time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut done => break,
            queued = outbound.recv() => {
                let Some(first) = queued else {
                    break;
                };
                if let Err(error) = write_batch(&mut sink, &mut outbound, first).await {
                    warn!(%error, "failed to write to websocket");
                    break;
                }
                keepalive.reset();
            }
            _ = keepalive.tick() => {
                if let Err(error) = sink.send(Message::Ping(Default::default())).await {
                    debug!(%error, "failed to send ping");
                    break;
                }
            }
        }
    }

    let close = Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: "connection closed".into(),
    }));
    if let Err(error) = sink.send(close).await {
        debug!(%error, "socket already closed");
    }
    let _ = sink.close().await;
    conn.destroy();
}

/// Writes `first` plus everything already queued behind it with a single flush.
async fn write_batch(
    sink: &mut SplitSink<WebSocket, Message>,
    outbound: &mut mpsc::Receiver<Utf8Bytes>,
    first: Utf8Bytes,
) -> Result<usize, axum::Error> {
    sink.feed(Message::Text(first)).await?;
    let mut frames = 1;
    while let Ok(next) = outbound.try_recv() {
        sink.feed(Message::Text(next)).await?;
        frames += 1;
    }
    sink.flush().await?;
    Ok(frames)
}
