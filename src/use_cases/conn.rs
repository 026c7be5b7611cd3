// Per-client connection: identity, the command registry inbound frames are routed
// through, the bounded outbound queue drained by the writer task, and the close signal.

use crate::domain::Identity;
use crate::domain::errors::CommandError;
use crate::interface_adapters::protocol::Envelope;
use crate::use_cases::lock;

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Outbound frames queued per connection before new ones are dropped.
pub const OUTBOUND_CAPACITY: usize = 256;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

type Callback = dyn Fn(Value) -> Result<(), CommandError> + Send + Sync;

/// A registered handler for one `group.name` pair.
#[derive(Clone)]
pub struct Command {
    callback: Arc<Callback>,
    // Removed from the registry on first invocation.
    once: bool,
}

impl Command {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Value) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            once: false,
        }
    }

    pub fn once<F>(callback: F) -> Self
    where
        F: Fn(Value) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            once: true,
        }
    }
}

/// Named commands to merge into one group of a connection's registry.
#[derive(Clone, Default)]
pub struct Commands {
    entries: HashMap<String, Command>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, command: Command) -> Self {
        self.entries.insert(name.to_string(), command);
        self
    }
}

pub struct Connection {
    conn_id: u64,
    identity: Identity,
    commands: Mutex<HashMap<String, HashMap<String, Command>>>,
    outbound: mpsc::Sender<Utf8Bytes>,
    closed: AtomicBool,
    done: Mutex<Vec<oneshot::Sender<()>>>,
}

impl Connection {
    /// Creates a connection and the receiving half of its outbound queue.
    pub fn new(identity: Identity) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        Self::with_capacity(identity, OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(
        identity: Identity,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        let (outbound, outbound_rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            conn_id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            identity,
            commands: Mutex::new(HashMap::new()),
            outbound,
            closed: AtomicBool::new(false),
            done: Mutex::new(Vec::new()),
        });
        (conn, outbound_rx)
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Merges `commands` into `group`, replacing entries with the same name.
    pub fn add_commands(&self, group: &str, commands: Commands) {
        let mut registry = lock(&self.commands);
        registry
            .entry(group.to_string())
            .or_default()
            .extend(commands.entries);
    }

    pub fn remove_commands_by_group(&self, group: &str) {
        lock(&self.commands).remove(group);
    }

    pub fn remove_commands_by_names(&self, group: &str, names: &[&str]) {
        let mut registry = lock(&self.commands);
        if let Some(entries) = registry.get_mut(group) {
            for name in names {
                entries.remove(*name);
            }
            if entries.is_empty() {
                registry.remove(group);
            }
        }
    }

    pub fn has_command(&self, group: &str, name: &str) -> bool {
        lock(&self.commands)
            .get(group)
            .is_some_and(|entries| entries.contains_key(name))
    }

    /// Runs the handler registered for `group.name`.
    ///
    /// The handler is invoked after the registry lock is released so it can
    /// register or remove commands on this same connection.
    pub fn execute_command(&self, group: &str, name: &str, body: Value) -> Result<(), CommandError> {
        let command = {
            let mut registry = lock(&self.commands);
            let entries = registry
                .get_mut(group)
                .ok_or_else(|| CommandError::UnknownGroup(group.to_string()))?;
            let command = entries
                .get(name)
                .cloned()
                .ok_or_else(|| CommandError::UnknownCommand {
                    group: group.to_string(),
                    name: name.to_string(),
                })?;
            if command.once {
                entries.remove(name);
            }
            command
        };

        (command.callback)(body)
    }

    /// Routes one inbound text frame. Failures are logged and the frame dropped.
    pub fn dispatch(&self, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(error) => {
                debug!(player_id = %self.id(), %error, "dropping malformed frame");
                return;
            }
        };

        if envelope.group.is_empty() {
            debug!(player_id = %self.id(), "dropping frame without a group");
            return;
        }

        if let Err(error) = self.execute_command(&envelope.group, &envelope.name, envelope.body) {
            debug!(
                player_id = %self.id(),
                group = %envelope.group,
                name = %envelope.name,
                %error,
                "command failed"
            );
        }
    }

    pub fn write_message<T: Serialize>(
        &self,
        group: &str,
        name: &str,
        body: T,
    ) -> Result<(), serde_json::Error> {
        let bytes = Envelope::new(group, name, body).encode()?;
        self.write_bytes(bytes);
        Ok(())
    }

    /// Queues an already encoded frame without blocking.
    pub fn write_bytes(&self, bytes: Utf8Bytes) {
        if self.is_closed() {
            debug!(player_id = %self.id(), "connection closed; dropping frame");
            return;
        }

        match self.outbound.try_send(bytes) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(player_id = %self.id(), "outbound queue full; dropping frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(player_id = %self.id(), "writer gone; dropping frame");
            }
        }
    }

    /// Resolves once the connection is destroyed, immediately if it already was.
    pub fn get_done(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = lock(&self.done);
        if self.is_closed() {
            let _ = tx.send(());
        } else {
            waiters.push(tx);
        }
        rx
    }

    /// Closes the connection. Only the first call has any effect.
    pub fn destroy(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Handlers capture lobby and game state; drop them with the connection.
        lock(&self.commands).clear();

        let waiters = std::mem::take(&mut *lock(&self.done));
        for waiter in waiters {
            let _ = waiter.send(());
        }
        debug!(player_id = %self.id(), conn_id = self.conn_id, "connection destroyed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("conn_id", &self.conn_id)
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
