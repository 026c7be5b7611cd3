// Wire protocol: the `{ group, name, body }` envelope and the payloads carried in it.
// Every frame in both directions uses the same envelope.

use crate::domain::{GameOption, Identity, Role, Round, Ruleset, Status};
use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GROUP_CLIENT: &str = "client";
pub const GROUP_LOBBIES: &str = "lobbies";
pub const GROUP_LOBBY: &str = "lobby";
pub const GROUP_GAME: &str = "game";

pub const CMD_GET: &str = "get";
pub const CMD_CREATE: &str = "create";
pub const CMD_JOIN: &str = "join";
pub const CMD_LEAVE: &str = "leave";
pub const CMD_KICK: &str = "kick";
pub const CMD_START: &str = "start";
pub const CMD_CHOOSE: &str = "choose";
pub const CMD_VOTEMAX: &str = "votemax";
pub const CMD_VOTE: &str = "vote";
pub const CMD_DECIDE: &str = "decide";
pub const CMD_ROUND: &str = "round";
pub const CMD_END: &str = "end";

/// Envelope for every frame. Inbound frames use `Envelope<Value>` and may omit
/// fields; typed bodies are decoded from that `Value` afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub body: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(group: &str, name: &str, body: T) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            body,
        }
    }

    /// Serializes once so the bytes can be shared by every recipient.
    pub fn encode(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}

/// Query string of the WebSocket upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Body of `lobbies.create`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLobbyRequest {
    #[serde(rename = "type", default)]
    pub ruleset: Ruleset,
    #[serde(default)]
    pub private: bool,
}

/// Body of `lobbies.join`.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinLobbyRequest {
    pub id: String,
}

/// Body of `lobby.kick`.
#[derive(Debug, Clone, Deserialize)]
pub struct KickRequest {
    #[serde(default)]
    pub id: String,
}

/// Roster broadcast as `lobby.get` and listed by `lobbies.get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub ruleset: Ruleset,
    pub private: bool,
    pub owner: Option<String>,
    pub clients: Vec<Identity>,
}

/// One roster entry of a game snapshot, with the role as seen by the recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub role: Role,
}

/// Per-recipient game snapshot broadcast as `game.get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    #[serde(rename = "type")]
    pub ruleset: Ruleset,
    pub option: GameOption,
    pub players: Vec<PlayerView>,
    pub rounds: Vec<Round>,
    pub captain: Option<String>,
}

/// Body of `game.end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEnd {
    pub status: Status,
}
