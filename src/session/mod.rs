//! Connection state and command handling
//!
//! A session moves through `Unregistered → Registered → Closed`:
//!
//! ```text
//!            REGISTER ok
//! Unregistered ─────────► Registered
//!       │                     │
//!       │ close()             │ close() / name reclaimed elsewhere
//!       ▼                     ▼
//!     Closed ◄────────────────┘
//! ```

pub mod connection;
mod dispatch;
pub mod state;
pub mod upstream;

pub use connection::{Connection, MAX_NAME_LEN};
pub use state::SessionPhase;
pub use upstream::{ConnectionHandle, ConnectionId, Upstream};

#[cfg(test)]
pub(crate) use upstream::recording;
