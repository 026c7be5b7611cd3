use serde::{Deserialize, Serialize};

// Stable participant identity handed out by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// An identity without an id cannot join lobbies or games.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }
}
