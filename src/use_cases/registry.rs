// Lobby registry: issues numeric lobby ids, stores lobbies, and drops a lobby
// again once its last member has left.

use crate::domain::errors::{ConfigError, RegistryError, StoreError};
use crate::domain::ports::Repository;
use crate::domain::Ruleset;
use crate::interface_adapters::protocol::LobbySnapshot;
use crate::use_cases::conn::Connection;
use crate::use_cases::game::PhaseTimeouts;
use crate::use_cases::lobby::Lobby;

use rand::Rng;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

// u64 holds every 18-digit number.
const MAX_ID_LEN: usize = 18;
const MAX_ID_ATTEMPTS: usize = 64;

/// Shared configuration applied to every lobby the registry creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySettings {
    /// Number of decimal digits in a lobby id.
    pub id_len: usize,
    /// Members allowed in one lobby.
    pub max_clients: usize,
    /// Phase timeouts for games started in these lobbies.
    pub timeouts: PhaseTimeouts,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            id_len: 4,
            max_clients: 10,
            timeouts: PhaseTimeouts::default(),
        }
    }
}

impl LobbySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_len == 0 {
            return Err(ConfigError::IdLengthZero);
        }
        if self.id_len > MAX_ID_LEN {
            return Err(ConfigError::IdLengthTooLong(self.id_len));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::MaxClientZero);
        }
        Ok(())
    }
}

pub struct LobbyRegistry {
    settings: LobbySettings,
    store: Arc<dyn Repository<Arc<Lobby>>>,
    // Bumped whenever the lobby list or a lobby's membership changes.
    changes: watch::Sender<u64>,
}

impl LobbyRegistry {
    pub fn new(
        settings: LobbySettings,
        store: Arc<dyn Repository<Arc<Lobby>>>,
    ) -> Result<Arc<Self>, RegistryError> {
        settings.validate()?;
        if !store.is_valid() {
            return Err(StoreError::Uninitialized.into());
        }

        let (changes, _) = watch::channel(0);
        Ok(Arc::new(Self {
            settings,
            store,
            changes,
        }))
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Creates a lobby under a fresh random id of `id_len` digits.
    pub fn create_lobby(
        self: &Arc<Self>,
        ruleset: Ruleset,
        private: bool,
    ) -> Result<Arc<Lobby>, RegistryError> {
        let digits = self.settings.id_len as u32;
        let low = 10u64.pow(digits - 1);
        let high = 10u64.pow(digits) - 1;
        let mut rng = rand::rng();

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = rng.random_range(low..=high).to_string();
            match self.store.get_by_id(&id) {
                Err(StoreError::NotFound) => {}
                Ok(_) => continue,
                Err(error) => return Err(error.into()),
            }

            let lobby = Lobby::new(
                id.clone(),
                ruleset,
                private,
                self.settings.max_clients,
                self.settings.timeouts,
            );
            match self.store.create(&id, lobby.clone()) {
                Ok(()) => {}
                Err(StoreError::AlreadyExists) => continue,
                Err(error) => return Err(error.into()),
            }

            self.watch_lobby(&lobby);
            info!(lobby_id = %id, ruleset = ruleset.name(), private, "lobby created");
            self.notify_changed();
            return Ok(lobby);
        }

        Err(StoreError::AlreadyExists.into())
    }

    pub fn get_lobby(&self, id: &str) -> Result<Arc<Lobby>, RegistryError> {
        if id.len() != self.settings.id_len || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RegistryError::InvalidId);
        }
        Ok(self.store.get_by_id(id)?)
    }

    pub fn all_lobbies(&self) -> Result<Vec<Arc<Lobby>>, RegistryError> {
        Ok(self.store.get_all()?)
    }

    pub fn remove_lobby(&self, id: &str) -> Result<(), RegistryError> {
        self.store.remove(id)?;
        info!(lobby_id = %id, "lobby removed");
        self.notify_changed();
        Ok(())
    }

    /// Public lobbies as listed by `lobbies.get`, ordered by id.
    pub fn summaries(&self) -> Result<Vec<LobbySnapshot>, RegistryError> {
        let mut summaries: Vec<LobbySnapshot> = self
            .all_lobbies()?
            .iter()
            .filter(|lobby| !lobby.is_private())
            .map(|lobby| lobby.snapshot())
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    /// The lobby `conn` is currently a member of, if any.
    pub fn lobby_of(&self, conn: &Arc<Connection>) -> Option<Arc<Lobby>> {
        let lobbies = self.all_lobbies().ok()?;
        lobbies.into_iter().find(|lobby| {
            lobby
                .member(conn.id())
                .is_some_and(|member| Arc::ptr_eq(&member, conn))
        })
    }

    fn watch_lobby(self: &Arc<Self>, lobby: &Arc<Lobby>) {
        let mut inserts = lobby.subscribe_insert();
        let mut removals = lobby.subscribe_remove();
        let registry = Arc::downgrade(self);
        let lobby = Arc::downgrade(lobby);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    joined = inserts.rx.recv() => {
                        if joined.is_none() {
                            break;
                        }
                    }
                    left = removals.rx.recv() => {
                        if left.is_none() {
                            break;
                        }
                        let (Some(registry), Some(lobby)) = (registry.upgrade(), lobby.upgrade()) else {
                            break;
                        };
                        if lobby.is_empty() {
                            if let Err(error) = registry.remove_lobby(lobby.id()) {
                                debug!(lobby_id = %lobby.id(), %error, "empty lobby already gone");
                            }
                            break;
                        }
                    }
                }

                match registry.upgrade() {
                    Some(registry) => registry.notify_changed(),
                    None => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identity;
    use crate::frameworks::store::MemoryStore;

    fn registry(settings: LobbySettings) -> Arc<LobbyRegistry> {
        LobbyRegistry::new(settings, Arc::new(MemoryStore::new())).expect("valid registry")
    }

    async fn settle(mut done: impl FnMut() -> bool) {
        for _ in 0..20 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn settings_are_validated() {
        let zero_len = LobbySettings {
            id_len: 0,
            ..LobbySettings::default()
        };
        assert_eq!(zero_len.validate(), Err(ConfigError::IdLengthZero));

        let long = LobbySettings {
            id_len: 19,
            ..LobbySettings::default()
        };
        assert_eq!(long.validate(), Err(ConfigError::IdLengthTooLong(19)));

        let empty = LobbySettings {
            max_clients: 0,
            ..LobbySettings::default()
        };
        assert_eq!(empty.validate(), Err(ConfigError::MaxClientZero));
        assert!(LobbyRegistry::new(empty, Arc::new(MemoryStore::new())).is_err());
    }

    #[test]
    fn uninitialized_store_is_refused() {
        let result = LobbyRegistry::new(LobbySettings::default(), Arc::new(MemoryStore::uninitialized()));
        assert!(matches!(
            result,
            Err(RegistryError::Store(StoreError::Uninitialized))
        ));
    }

    #[tokio::test]
    async fn created_lobbies_get_numeric_ids_of_the_configured_length() {
        let registry = registry(LobbySettings::default());
        let lobby = registry
            .create_lobby(Ruleset::Avalon, false)
            .expect("create lobby");

        assert_eq!(lobby.id().len(), 4);
        assert!(lobby.id().bytes().all(|b| b.is_ascii_digit()));
        assert!(!lobby.id().starts_with('0'));

        let found = registry.get_lobby(lobby.id()).expect("lookup");
        assert!(Arc::ptr_eq(&found, &lobby));
        assert_eq!(found.ruleset(), Ruleset::Avalon);
    }

    #[tokio::test]
    async fn lookups_validate_the_id_shape() {
        let registry = registry(LobbySettings::default());
        assert!(matches!(registry.get_lobby("12"), Err(RegistryError::InvalidId)));
        assert!(matches!(registry.get_lobby("12ab"), Err(RegistryError::InvalidId)));
        assert!(matches!(
            registry.get_lobby("1234"),
            Err(RegistryError::Store(StoreError::NotFound))
        ));
    }

    #[tokio::test]
    async fn id_space_exhaustion_is_reported() {
        let registry = registry(LobbySettings {
            id_len: 1,
            ..LobbySettings::default()
        });

        let created = (0..100)
            .filter(|_| registry.create_lobby(Ruleset::Basic, false).is_ok())
            .count();
        assert_eq!(created, 9);
        assert!(matches!(
            registry.create_lobby(Ruleset::Basic, false),
            Err(RegistryError::Store(StoreError::AlreadyExists))
        ));
    }

    #[tokio::test]
    async fn lobby_is_removed_once_its_last_member_leaves() {
        let registry = registry(LobbySettings::default());
        let mut changes = registry.changes();
        let lobby = registry
            .create_lobby(Ruleset::Basic, false)
            .expect("create lobby");
        let (conn, _rx) = Connection::new(Identity::new("a", "A"));

        lobby.join(&conn).expect("join");
        assert!(registry.lobby_of(&conn).is_some());

        lobby.leave(&conn).expect("leave");
        settle(|| registry.get_lobby(lobby.id()).is_err()).await;

        assert!(matches!(
            registry.get_lobby(lobby.id()),
            Err(RegistryError::Store(StoreError::NotFound))
        ));
        assert!(registry.lobby_of(&conn).is_none());
        assert!(changes.has_changed().expect("registry alive"));
        assert!(*changes.borrow_and_update() >= 2);
    }

    #[tokio::test]
    async fn private_lobbies_are_not_listed() {
        let registry = registry(LobbySettings::default());
        let public = registry
            .create_lobby(Ruleset::Basic, false)
            .expect("public lobby");
        registry
            .create_lobby(Ruleset::Basic, true)
            .expect("private lobby");

        let listed = registry.summaries().expect("summaries");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, public.id());
        assert_eq!(registry.all_lobbies().expect("all").len(), 2);
    }
}
