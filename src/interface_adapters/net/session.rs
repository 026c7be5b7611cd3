// Session-level `lobbies` commands every connection gets on connect.

use crate::domain::errors::CommandError;
use crate::interface_adapters::protocol::{
    CMD_CREATE, CMD_GET, CMD_JOIN, CreateLobbyRequest, GROUP_LOBBIES, JoinLobbyRequest,
};
use crate::use_cases::{Command, Commands, Connection, LobbyRegistry};

use std::sync::{Arc, Weak};
use tracing::debug;

pub fn install_session_commands(conn: &Arc<Connection>, registry: &Arc<LobbyRegistry>) {
    let commands = Commands::new()
        .with(CMD_GET, session_command(conn, registry, |conn, registry, _| {
            send_lobby_list(&conn, &registry)
        }))
        .with(CMD_CREATE, session_command(conn, registry, |conn, registry, body| {
            let request: CreateLobbyRequest = if body.is_null() {
                CreateLobbyRequest::default()
            } else {
                serde_json::from_value(body)?
            };
            leave_current(&conn, &registry);
            let lobby = registry.create_lobby(request.ruleset, request.private)?;
            if let Err(error) = lobby.join(&conn) {
                let _ = registry.remove_lobby(lobby.id());
                return Err(error.into());
            }
            Ok(())
        }))
        .with(CMD_JOIN, session_command(conn, registry, |conn, registry, body| {
            let request: JoinLobbyRequest = serde_json::from_value(body)?;
            let lobby = registry.get_lobby(&request.id)?;
            if lobby
                .member(conn.id())
                .is_some_and(|member| Arc::ptr_eq(&member, &conn))
            {
                return Ok(());
            }
            leave_current(&conn, &registry);
            lobby.join(&conn)?;
            Ok(())
        }));

    conn.add_commands(GROUP_LOBBIES, commands);
}

pub fn send_lobby_list(conn: &Connection, registry: &LobbyRegistry) -> Result<(), CommandError> {
    let summaries = registry.summaries()?;
    conn.write_message(GROUP_LOBBIES, CMD_GET, summaries)?;
    Ok(())
}

// Handlers hold weak references; the connection owns its registry of commands.
fn session_command<F>(conn: &Arc<Connection>, registry: &Arc<LobbyRegistry>, handler: F) -> Command
where
    F: Fn(Arc<Connection>, Arc<LobbyRegistry>, serde_json::Value) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
{
    let conn: Weak<Connection> = Arc::downgrade(conn);
    let registry: Weak<LobbyRegistry> = Arc::downgrade(registry);
    Command::new(move |body| {
        let (Some(conn), Some(registry)) = (conn.upgrade(), registry.upgrade()) else {
            return Ok(());
        };
        handler(conn, registry, body)
    })
}

fn leave_current(conn: &Arc<Connection>, registry: &LobbyRegistry) {
    if let Some(current) = registry.lobby_of(conn) {
        if let Err(error) = current.leave(conn) {
            debug!(lobby_id = %current.id(), %error, "failed to leave previous lobby");
        }
    }
}
