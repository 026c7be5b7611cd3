use crate::domain::errors::ConfigError;
use crate::use_cases::{LobbySettings, PhaseTimeouts};
use std::{env, str::FromStr, time::Duration};

// Runtime/server settings read from the environment (after `.env` is loaded).

pub fn http_port() -> u16 {
    env::var("GAME_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    /// Verify tokens against the identity service.
    Service,
    /// Trust the token as the participant id. Development only.
    Guest,
}

impl FromStr for IdentityMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "service" => Ok(IdentityMode::Service),
            "guest" => Ok(IdentityMode::Guest),
            _ => Err(()),
        }
    }
}

pub fn identity_mode() -> Result<IdentityMode, ConfigError> {
    parse_var("IDENTITY_MODE", IdentityMode::Service)
}

pub fn identity_service_url() -> String {
    env::var("IDENTITY_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:3002".to_string())
}

pub fn identity_verify_timeout() -> Duration {
    let millis = env::var("IDENTITY_VERIFY_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1500);
    Duration::from_millis(millis)
}

/// Lobby and phase settings. Unparsable or out-of-range values are errors.
pub fn lobby_settings() -> Result<LobbySettings, ConfigError> {
    let settings = LobbySettings {
        id_len: parse_var("LOBBY_ID_LEN", 4)?,
        max_clients: parse_var("LOBBY_MAX_CLIENTS", 10)?,
        timeouts: PhaseTimeouts {
            propose: Duration::from_secs(parse_var("PROPOSE_TIMEOUT_SECS", 60)?),
            vote: Duration::from_secs(parse_var("VOTE_TIMEOUT_SECS", 180)?),
            decide: Duration::from_secs(parse_var("DECIDE_TIMEOUT_SECS", 30)?),
        },
    };
    settings.validate()?;
    Ok(settings)
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    parse_value(key, env::var(key).ok(), default)
}

fn parse_value<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
