//! Outbound frames
//!
//! Every server frame is a JSON array whose first element identifies the
//! origin: the server name for server notices, or the member's display name
//! for frames relayed on behalf of a member.

use serde_json::{Number, Value};

/// Numeric code sent with a name collision error
pub const ERR_NAME_IN_USE: u16 = 433;

/// Text sent with a name collision error
pub const ERR_NAME_IN_USE_TEXT: &str = "Name already in use.";

/// A frame sent from the hub to a client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame<'a> {
    /// `[server, "ECHO", text]`
    Echo { server: &'a str, text: &'a str },
    /// `[server, "ERROR", 433, "Name already in use."]`
    NameInUse { server: &'a str },
    /// `[server, "REGISTER", realname]`, announced to the rest of the channel
    Joined { server: &'a str, realname: &'a str },
    /// `[server, "REGISTER", realname, token]`, sent to the registrant only
    Registered {
        server: &'a str,
        realname: &'a str,
        token: &'a str,
    },
    /// `[server, "USERS", realname...]`
    Users {
        server: &'a str,
        realnames: Vec<&'a str>,
    },
    /// `[realname, "LOCATION", lat, lng]`
    Location {
        realname: &'a str,
        lat: &'a Number,
        lng: &'a Number,
    },
    /// `[realname, "QUIT"]`
    Quit { realname: &'a str },
}

impl ServerFrame<'_> {
    /// Command word of this frame
    pub fn command(&self) -> &'static str {
        match self {
            ServerFrame::Echo { .. } => "ECHO",
            ServerFrame::NameInUse { .. } => "ERROR",
            ServerFrame::Joined { .. } | ServerFrame::Registered { .. } => "REGISTER",
            ServerFrame::Users { .. } => "USERS",
            ServerFrame::Location { .. } => "LOCATION",
            ServerFrame::Quit { .. } => "QUIT",
        }
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> String {
        let command = Value::from(self.command());

        let items: Vec<Value> = match self {
            ServerFrame::Echo { server, text } => {
                vec![Value::from(*server), command, Value::from(*text)]
            }
            ServerFrame::NameInUse { server } => vec![
                Value::from(*server),
                command,
                Value::from(ERR_NAME_IN_USE),
                Value::from(ERR_NAME_IN_USE_TEXT),
            ],
            ServerFrame::Joined { server, realname } => {
                vec![Value::from(*server), command, Value::from(*realname)]
            }
            ServerFrame::Registered {
                server,
                realname,
                token,
            } => vec![
                Value::from(*server),
                command,
                Value::from(*realname),
                Value::from(*token),
            ],
            ServerFrame::Users { server, realnames } => {
                let mut items = Vec::with_capacity(realnames.len() + 2);
                items.push(Value::from(*server));
                items.push(command);
                items.extend(realnames.iter().map(|name| Value::from(*name)));
                items
            }
            ServerFrame::Location { realname, lat, lng } => vec![
                Value::from(*realname),
                command,
                Value::Number((*lat).clone()),
                Value::Number((*lng).clone()),
            ],
            ServerFrame::Quit { realname } => vec![Value::from(*realname), command],
        };

        Value::Array(items).to_string()
    }
}
