// Domain-level errors shared across the lobby, game and connection layers.

use thiserror::Error;

/// Failures surfaced by command dispatch on a connection.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command group: {0}")]
    UnknownGroup(String),

    #[error("unknown command: {group}.{name}")]
    UnknownCommand { group: String, name: String },

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("client has not been initialized")]
    ClientInvalid,

    #[error("client already exists")]
    ClientExists,

    #[error("client does not exist")]
    ClientNotFound,

    #[error("invalid client")]
    InvalidClient,

    #[error("only the lobby owner can do that")]
    NotOwner,

    #[error("lobby is full")]
    LobbyFull,

    #[error("a game is already running in this lobby")]
    GameInProgress,

    #[error("failed to encode lobby snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("game requires between 5 and 10 players, have {0}")]
    InvalidClients(usize),

    #[error("number of players does not match the required assignees - want: {want}, have: {have}")]
    MinAssignees { want: usize, have: usize },

    #[error("one or more players are invalid")]
    InvalidPlayer,

    #[error("a player was proposed more than once")]
    DuplicatePlayer,

    #[error("percival and morgana require the avalon ruleset")]
    OptionRequiresAvalon,
}

/// Errors returned by the keyed in-memory store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record does not exist")]
    NotFound,

    #[error("record already exists")]
    AlreadyExists,

    #[error("store has not been initialized")]
    Uninitialized,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("lobby id is not valid")]
    InvalidId,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("lobby id length cannot be zero")]
    IdLengthZero,

    #[error("lobby id length {0} does not fit in a numeric id")]
    IdLengthTooLong(usize),

    #[error("max clients cannot be zero")]
    MaxClientZero,

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid session token")]
    InvalidToken,

    #[error("identity provider unavailable")]
    UpstreamUnavailable,
}
