//! WebSocket server
//!
//! Accepts TCP connections, upgrades them to WebSocket on `/<channel>`, and
//! drives one [`Connection`](crate::session::Connection) per session.

pub mod config;
pub mod listener;
mod session;

pub use config::ServerConfig;
pub use listener::HubServer;
