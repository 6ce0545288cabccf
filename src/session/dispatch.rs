//! Command dispatch table
//!
//! Maps a case-folded command name to its handler and declared arity.
//! Handlers run with the channel's roster locked.

use crate::protocol::{Arg, Arity};
use crate::registry::Roster;

use super::connection::Connection;

/// Handler signature: the connection, its locked channel roster, and the
/// arguments following the command name
pub(crate) type HandlerFn = fn(&mut Connection, &mut Roster, Vec<Arg>);

/// Entry in the dispatch table
pub(crate) struct Handler {
    pub name: &'static str,
    pub arity: Arity,
    pub run: HandlerFn,
}

pub(crate) const HANDLERS: &[Handler] = &[
    Handler {
        name: "echo",
        arity: Arity::exactly(1),
        run: Connection::usr_echo,
    },
    Handler {
        name: "register",
        arity: Arity::between(1, 2),
        run: Connection::usr_register,
    },
    Handler {
        name: "location",
        arity: Arity::exactly(2),
        run: Connection::usr_location,
    },
];

/// Find the handler for a case-folded command name
pub(crate) fn lookup(command: &str) -> Option<&'static Handler> {
    HANDLERS.iter().find(|handler| handler.name == command)
}
