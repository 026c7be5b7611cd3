// Network adapter modules split by client sockets vs plain HTTP routes.

pub mod client;
pub mod internal;
pub mod pump;
pub mod session;

pub use client::{spawn_lobby_list_broadcaster, ws_handler};
pub use internal::list_lobbies_handler;
