// Live connections keyed by participant id. A reconnect replaces the previous
// connection only after that one has fully shut down.

use crate::use_cases::conn::Connection;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn`, destroying and awaiting any connection already held
    /// for the same participant. Also removes `conn` again once it closes.
    pub async fn register(self: &Arc<Self>, conn: &Arc<Connection>) {
        {
            let mut connections = self.connections.lock().await;
            if let Some(previous) = connections.remove(conn.id()) {
                let done = previous.get_done();
                previous.destroy();
                let _ = done.await;
                info!(
                    player_id = %conn.id(),
                    old_conn_id = previous.conn_id(),
                    new_conn_id = conn.conn_id(),
                    "connection replaced by newer session"
                );
            }
            connections.insert(conn.id().to_string(), conn.clone());
        }

        let registry = Arc::downgrade(self);
        let closed = conn.clone();
        let done = conn.get_done();
        tokio::spawn(async move {
            if done.await.is_ok() {
                if let Some(registry) = registry.upgrade() {
                    registry.remove_if_current(&closed).await;
                }
            }
        });
    }

    /// Removes the entry for `conn`'s participant only if it is still `conn`.
    pub async fn remove_if_current(&self, conn: &Arc<Connection>) -> bool {
        let mut connections = self.connections.lock().await;
        match connections.get(conn.id()) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                connections.remove(conn.id());
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.lock().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }
}
