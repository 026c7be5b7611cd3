// Use cases layer: connections, lobbies and the game engine.

pub mod conn;
pub mod connections;
pub mod game;
pub mod lobby;
pub mod phase;
pub mod registry;

pub use conn::{Command, Commands, Connection};
pub use connections::ConnectionRegistry;
pub use game::{Game, PhaseTimeouts};
pub use lobby::{Lobby, Subscription};
pub use registry::{LobbyRegistry, LobbySettings};

use std::sync::{Mutex, MutexGuard, PoisonError};

// Recovers the guard from a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
