// A lobby: sorted membership, owner privileges, membership subscriptions and the
// hand-off into a running game.

use crate::domain::errors::{CommandError, LobbyError};
use crate::domain::{GameOption, Ruleset, Status};
use crate::interface_adapters::protocol::{
    CMD_GET, CMD_KICK, CMD_LEAVE, CMD_START, Envelope, GROUP_LOBBY, KickRequest, LobbySnapshot,
};
use crate::use_cases::conn::{Command, Commands, Connection};
use crate::use_cases::game::{Game, PhaseTimeouts};
use crate::use_cases::lock;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info, info_span};

type Subscribers = BTreeMap<u64, mpsc::UnboundedSender<Arc<Connection>>>;

/// Receives every connection that joins (or leaves) after subscribing.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::UnboundedReceiver<Arc<Connection>>,
}

#[derive(Default)]
struct LobbyInner {
    // Keyed by participant id so iteration order is the join-independent sort order.
    members: BTreeMap<String, Arc<Connection>>,
    owner: Option<String>,
    insert_subs: Subscribers,
    remove_subs: Subscribers,
    next_sub_id: u64,
    game_running: bool,
}

impl LobbyInner {
    /// Makes the first member the owner. Returns the connections that lost and
    /// gained the privilege, if it moved.
    fn recompute_owner(&mut self) -> (Option<Arc<Connection>>, Option<Arc<Connection>>) {
        // First key in sort order, or nobody once the lobby is empty.
        let next = self.members.values().next().cloned();
        let next_id = next.as_ref().map(|conn| conn.id().to_string());
        if next_id == self.owner {
            return (None, None);
        }

        // Previous owner may already be gone (it just left).
        let previous = self
            .owner
            .take()
            .and_then(|id| self.members.get(&id).cloned());
        self.owner = next_id;
        (previous, next)
    }
}

pub struct Lobby {
    id: String,
    ruleset: Ruleset,
    private: bool,
    max_clients: usize,
    timeouts: PhaseTimeouts,
    this: Weak<Lobby>,
    inner: Mutex<LobbyInner>,
}

impl Lobby {
    pub fn new(
        id: impl Into<String>,
        ruleset: Ruleset,
        private: bool,
        max_clients: usize,
        timeouts: PhaseTimeouts,
    ) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|this| Self {
            id,
            ruleset,
            private,
            max_clients,
            timeouts,
            this: this.clone(),
            inner: Mutex::new(LobbyInner::default()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ruleset(&self) -> Ruleset {
        self.ruleset
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn owner(&self) -> Option<String> {
        lock(&self.inner).owner.clone()
    }

    pub fn member(&self, id: &str) -> Option<Arc<Connection>> {
        lock(&self.inner).members.get(id).cloned()
    }

    pub fn members(&self) -> Vec<Arc<Connection>> {
        lock(&self.inner).members.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).members.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).members.is_empty()
    }

    pub fn is_game_running(&self) -> bool {
        lock(&self.inner).game_running
    }

    pub fn join(&self, conn: &Arc<Connection>) -> Result<(), LobbyError> {
        if !conn.identity().is_valid() {
            return Err(LobbyError::ClientInvalid);
        }

        let (is_owner, subscribers) = {
            let mut inner = lock(&self.inner);
            if inner.members.contains_key(conn.id()) {
                return Err(LobbyError::ClientExists);
            }
            if inner.members.len() >= self.max_clients {
                return Err(LobbyError::LobbyFull);
            }

            // Insert, then let the sorted order decide who owns the lobby.
            inner.members.insert(conn.id().to_string(), conn.clone());
            let (revoked, granted) = inner.recompute_owner();
            let is_owner = granted
                .as_ref()
                .is_some_and(|owner| Arc::ptr_eq(owner, conn));

            // Commands are swapped before the lock is released so privileges
            // always match `owner`.
            self.install_commands(conn, is_owner);
            if let Some(previous) = revoked {
                self.install_commands(&previous, false);
            }

            let subscribers: Vec<_> = inner.insert_subs.values().cloned().collect();
            (is_owner, subscribers)
        };

        for subscriber in subscribers {
            let _ = subscriber.send(conn.clone());
        }
        self.watch_member(conn);

        info!(lobby_id = %self.id, player_id = %conn.id(), is_owner, "client joined lobby");
        self.send()
    }

    pub fn leave(&self, conn: &Connection) -> Result<(), LobbyError> {
        if !conn.identity().is_valid() {
            return Err(LobbyError::ClientInvalid);
        }

        let (removed, subscribers) = {
            let mut inner = lock(&self.inner);
            let removed = inner
                .members
                .remove(conn.id())
                .ok_or(LobbyError::ClientNotFound)?;
            removed.remove_commands_by_group(GROUP_LOBBY);

            // The next member in sort order, if any, inherits ownership.
            let (_, granted) = inner.recompute_owner();
            if let Some(owner) = granted {
                self.install_commands(&owner, true);
            }

            let subscribers: Vec<_> = inner.remove_subs.values().cloned().collect();
            (removed, subscribers)
        };

        for subscriber in subscribers {
            let _ = subscriber.send(removed.clone());
        }

        info!(lobby_id = %self.id, player_id = %removed.id(), "client left lobby");
        self.send()
    }

    pub fn kick(&self, target: &str) -> Result<(), LobbyError> {
        let member = self.member(target).ok_or(LobbyError::InvalidClient)?;
        self.leave(&member)?;
        info!(lobby_id = %self.id, player_id = %target, "client kicked");
        Ok(())
    }

    /// Starts a game with the current members. One game runs at a time.
    pub fn start(&self, option: GameOption) -> Result<(), CommandError> {
        let members = {
            let inner = lock(&self.inner);
            if inner.game_running {
                return Err(LobbyError::GameInProgress.into());
            }
            inner.members.values().cloned().collect::<Vec<_>>()
        };

        let game = Game::new(members, self.ruleset, option, self.timeouts)?;
        // Re-check: another start may have won while the game was built.
        {
            let mut inner = lock(&self.inner);
            if inner.game_running {
                return Err(LobbyError::GameInProgress.into());
            }
            inner.game_running = true;
        }

        let lobby = self.this.clone();
        let span = info_span!("game", lobby_id = %self.id);
        tokio::spawn(
            async move {
                let (status_tx, status_rx) = oneshot::channel();
                game.run(status_tx).await;
                // Free the lobby for the next game once this one reports.
                let status: Status = status_rx.await.unwrap_or_default();
                if let Some(lobby) = lobby.upgrade() {
                    lock(&lobby.inner).game_running = false;
                }
                info!(?status, "lobby ready for another game");
            }
            .instrument(span),
        );
        Ok(())
    }

    pub fn snapshot(&self) -> LobbySnapshot {
        let inner = lock(&self.inner);
        LobbySnapshot {
            id: self.id.clone(),
            ruleset: self.ruleset,
            private: self.private,
            owner: inner.owner.clone(),
            clients: inner
                .members
                .values()
                .map(|conn| conn.identity().clone())
                .collect(),
        }
    }

    /// Broadcasts the roster to every member as `lobby.get`.
    pub fn send(&self) -> Result<(), LobbyError> {
        let bytes = Envelope::new(GROUP_LOBBY, CMD_GET, self.snapshot()).encode()?;
        for member in self.members() {
            member.write_bytes(bytes.clone());
        }
        Ok(())
    }

    pub fn subscribe_insert(&self) -> Subscription {
        self.subscribe(|inner| &mut inner.insert_subs)
    }

    pub fn remove_subscribe_insert(&self, id: u64) -> bool {
        lock(&self.inner).insert_subs.remove(&id).is_some()
    }

    pub fn subscribe_remove(&self) -> Subscription {
        self.subscribe(|inner| &mut inner.remove_subs)
    }

    pub fn remove_subscribe_remove(&self, id: u64) -> bool {
        lock(&self.inner).remove_subs.remove(&id).is_some()
    }

    fn subscribe(&self, pick: fn(&mut LobbyInner) -> &mut Subscribers) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        pick(&mut inner).insert(id, tx);
        Subscription { id, rx }
    }

    /// Replaces the member's `lobby` command group to match its privileges.
    /// Called with `inner` held; touches only the connection's own registry.
    fn install_commands(&self, conn: &Arc<Connection>, owner: bool) {
        let mut commands = Commands::new()
            .with(CMD_GET, self.get_command(conn))
            .with(CMD_LEAVE, self.leave_command(conn));
        if owner {
            commands = commands
                .with(CMD_KICK, self.kick_command(conn))
                .with(CMD_START, self.start_command(conn));
        }

        conn.remove_commands_by_group(GROUP_LOBBY);
        conn.add_commands(GROUP_LOBBY, commands);
    }

    fn get_command(&self, conn: &Arc<Connection>) -> Command {
        let lobby = self.this.clone();
        let member = Arc::downgrade(conn);
        Command::new(move |_| {
            let (Some(lobby), Some(member)) = (lobby.upgrade(), member.upgrade()) else {
                return Ok(());
            };
            member
                .write_message(GROUP_LOBBY, CMD_GET, lobby.snapshot())
                .map_err(LobbyError::from)?;
            Ok(())
        })
    }

    fn leave_command(&self, conn: &Arc<Connection>) -> Command {
        let lobby = self.this.clone();
        let member = Arc::downgrade(conn);
        Command::new(move |_| {
            let (Some(lobby), Some(member)) = (lobby.upgrade(), member.upgrade()) else {
                return Ok(());
            };
            lobby.leave(&member)?;
            Ok(())
        })
    }

    fn kick_command(&self, conn: &Arc<Connection>) -> Command {
        let lobby = self.this.clone();
        let caller = Arc::downgrade(conn);
        Command::new(move |body| {
            let (Some(lobby), Some(caller)) = (lobby.upgrade(), caller.upgrade()) else {
                return Ok(());
            };
            lobby.ensure_owner(&caller)?;
            let request: KickRequest = serde_json::from_value(body)?;
            lobby.kick(&request.id)?;
            Ok(())
        })
    }

    fn start_command(&self, conn: &Arc<Connection>) -> Command {
        let lobby = self.this.clone();
        let caller = Arc::downgrade(conn);
        Command::new(move |body| {
            let (Some(lobby), Some(caller)) = (lobby.upgrade(), caller.upgrade()) else {
                return Ok(());
            };
            lobby.ensure_owner(&caller)?;
            // A missing body starts a game without optional roles.
            let option = if body.is_null() {
                GameOption::NONE
            } else {
                serde_json::from_value(body)?
            };
            lobby.start(option)
        })
    }

    /// Owner commands re-check the caller against the current owner.
    fn ensure_owner(&self, caller: &Arc<Connection>) -> Result<(), LobbyError> {
        let inner = lock(&self.inner);
        let owns = inner.owner.as_deref() == Some(caller.id())
            && inner
                .members
                .get(caller.id())
                .is_some_and(|member| Arc::ptr_eq(member, caller));
        if owns { Ok(()) } else { Err(LobbyError::NotOwner) }
    }

    /// Removes the member once its connection closes, unless it already left.
    fn watch_member(&self, conn: &Arc<Connection>) {
        let lobby = self.this.clone();
        let member = conn.clone();
        let done = conn.get_done();
        tokio::spawn(async move {
            if done.await.is_err() {
                return;
            }
            let Some(lobby) = lobby.upgrade() else {
                return;
            };
            let current = lobby
                .member(member.id())
                .is_some_and(|current| Arc::ptr_eq(&current, &member));
            if current {
                if let Err(error) = lobby.leave(&member) {
                    debug!(lobby_id = %lobby.id(), player_id = %member.id(), %error, "leave on close failed");
                }
            }
        });
    }
}
