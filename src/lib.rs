//! Realtime channel hub
//!
//! Clients connect over WebSocket to `/<channel>`, register a display name,
//! and exchange short broadcast messages with everyone else in the same
//! channel. A name is protected by a token issued at registration: a client
//! that reconnects presents the token to take its name back from the stale
//! connection.
//!
//! # Layout
//!
//! - [`registry`]: process-wide channel map, per-channel name tables, tokens
//! - [`session`]: per-client state machine and command dispatch
//! - [`protocol`]: JSON frame parsing and encoding
//! - [`server`]: TCP listener, WebSocket upgrade, keepalive
//!
//! The hub core only sees a transport through the [`Upstream`] trait, so it
//! can be driven without a socket:
//!
//! ```
//! use std::sync::Arc;
//! use sigame_rs::{ChannelRegistry, Upstream};
//!
//! struct Print;
//!
//! impl Upstream for Print {
//!     fn send(&self, frame: &str) {
//!         println!("{frame}");
//!     }
//!     fn close(&self) {}
//! }
//!
//! # tokio_test::block_on(async {
//! let registry = ChannelRegistry::new("sigame");
//! let mut conn = registry.connection("room1", Arc::new(Print)).await?;
//! conn.message(r#"["REGISTER", "Alice"]"#).await;
//! assert_eq!(conn.realname(), Some("Alice"));
//! conn.close().await;
//! # Ok::<(), sigame_rs::RegistryError>(())
//! # }).unwrap();
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use error::{Error, Result};
pub use registry::{Channel, ChannelRegistry, ChannelStats, RegistryError};
pub use server::{HubServer, ServerConfig};
pub use session::{Connection, ConnectionId, SessionPhase, Upstream};
