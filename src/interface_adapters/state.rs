use crate::domain::ports::IdentityProvider;
use crate::use_cases::{ConnectionRegistry, LobbyRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Lobbies by id, plus the change feed behind `lobbies.get` broadcasts.
    pub lobby_registry: Arc<LobbyRegistry>,
    // One live connection per participant id.
    pub connections: Arc<ConnectionRegistry>,
    // Resolves the upgrade token into an identity.
    pub identity: Arc<dyn IdentityProvider>,
}
