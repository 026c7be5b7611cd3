// Frameworks: configuration, storage and server bootstrap.

pub mod config;
pub mod server;
pub mod store;
