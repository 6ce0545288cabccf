//! Channel registry and name tables
//!
//! The registry maps channel names to channels; each channel maps display
//! names to the connections holding them.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<ChannelRegistry>
//!               ┌──────────────────────────────┐
//!               │ channels: HashMap<name,      │
//!               │   Arc<Channel {              │
//!               │     roster: Mutex<Roster {   │
//!               │       names: name → Member   │
//!               │     }>                       │
//!               │   }>                         │
//!               │ >                            │
//!               └──────────────┬───────────────┘
//!                              │
//!         ┌────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼
//!   [Connection]         [Connection]         [Connection]
//!   message(raw)         message(raw)         close()
//!         │                    │                    │
//!         └──► roster.srv_message() ──► Upstream::send() ──► WebSocket
//! ```
//!
//! # Ownership
//!
//! The registry owns channels. Transport sessions own their connections.
//! A roster entry holds only a [`ConnectionHandle`](crate::session::ConnectionHandle)
//! (id, upstream, liveness flag), never the connection itself.
//!
//! Channels are never removed: a registry grows with the number of distinct
//! channel names it has seen.

pub mod channel;
pub mod error;
pub mod store;
pub mod token;

pub use channel::{Channel, ChannelStats, Roster};
pub use error::RegistryError;
pub use store::{ChannelRegistry, MAX_CHANNEL_NAME_LEN};
pub use token::Token;
