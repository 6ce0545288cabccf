//! Wire protocol
//!
//! Frames are UTF-8 JSON arrays carried as WebSocket text messages.
//!
//! ```text
//! client → hub   ["REGISTER", "Alice"]
//! hub → client   ["sigame", "REGISTER", "Alice", "<token>"]
//! hub → client   ["sigame", "USERS", "Alice", "Bob"]
//! client → hub   ["LOCATION", 12.3, 45.6]
//! hub → channel  ["Alice", "LOCATION", 12.3, 45.6]
//! ```

pub mod command;
pub mod frame;

pub use command::{parse_frame, Arg, Arity, Inbound};
pub use frame::{ServerFrame, ERR_NAME_IN_USE, ERR_NAME_IN_USE_TEXT};
