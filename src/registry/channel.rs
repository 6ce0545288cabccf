//! Channel and its name table
//!
//! A channel is a broadcast scope. Its [`Roster`] maps canonical names to
//! the member holding them and sits behind a per-channel mutex, so every
//! command touching one channel runs to completion before the next starts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use super::error::RegistryError;
use super::token::Token;
use crate::protocol::ServerFrame;
use crate::session::{Connection, ConnectionHandle, ConnectionId, Upstream};

/// A named channel
pub struct Channel {
    name: String,
    srvname: Arc<str>,
    roster: Mutex<Roster>,
}

impl Channel {
    pub(crate) fn new(name: String, srvname: Arc<str>) -> Self {
        let roster = Roster::new(name.clone(), Arc::clone(&srvname));
        Self {
            name,
            srvname,
            roster: Mutex::new(roster),
        }
    }

    /// Canonical channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server name used as the origin of server frames
    pub fn server_name(&self) -> &str {
        &self.srvname
    }

    /// Create an unregistered connection bound to this channel
    ///
    /// The connection does not appear in the name table until it registers.
    pub fn connection(self: &Arc<Self>, upstream: Arc<dyn Upstream>) -> Connection {
        Connection::new(Arc::clone(self), Arc::clone(&self.srvname), upstream)
    }

    /// Lock the name table
    pub async fn lock(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().await
    }

    /// Snapshot of the current members
    pub async fn stats(&self) -> ChannelStats {
        let roster = self.roster.lock().await;
        ChannelStats {
            members: roster.len(),
            realnames: roster.realnames().map(str::to_owned).collect(),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("name", &self.name).finish()
    }
}

/// Statistics for a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    /// Number of registered members
    pub members: usize,
    /// Display names of registered members, in table order
    pub realnames: Vec<String>,
}

/// Entry in a channel's name table
#[derive(Debug)]
struct Member {
    handle: Arc<ConnectionHandle>,
    realname: String,
    token: Token,
}

/// Name table of one channel
///
/// A canonical name is present iff an active connection holds it.
/// Iteration order of the table is unspecified, so broadcast order and the
/// order of names in a `USERS` frame are too.
#[derive(Debug)]
pub struct Roster {
    channel: String,
    srvname: Arc<str>,
    names: HashMap<String, Member>,
}

impl Roster {
    fn new(channel: String, srvname: Arc<str>) -> Self {
        Self {
            channel,
            srvname,
            names: HashMap::new(),
        }
    }

    /// Number of registered members
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no member is registered
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether a canonical name is taken
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Display names of all members
    pub fn realnames(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(|member| member.realname.as_str())
    }

    /// Bind a canonical name to a connection
    ///
    /// A free name is taken immediately. A held name is only handed over if
    /// `old_token` matches the token on file; the current holder is then
    /// closed (its `QUIT` goes out to the channel) before the new entry is
    /// inserted. Any other attempt fails with `NameCollision` and leaves the
    /// holder untouched.
    pub fn add_name(
        &mut self,
        name: &str,
        realname: &str,
        handle: &Arc<ConnectionHandle>,
        token: Token,
        old_token: Option<&str>,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.names.get(name) {
            if !existing.token.matches(old_token) {
                tracing::debug!(
                    channel = %self.channel,
                    name = name,
                    conn_id = %handle.id(),
                    "Name collision"
                );
                return Err(RegistryError::NameCollision(name.to_owned()));
            }

            let holder = Arc::clone(&existing.handle);
            let held_as = existing.realname.clone();

            tracing::info!(
                channel = %self.channel,
                name = name,
                evicted = %holder.id(),
                conn_id = %handle.id(),
                "Name reclaimed with token, evicting holder"
            );

            self.evict(name, &held_as, &holder);
        }

        self.names.insert(
            name.to_owned(),
            Member {
                handle: Arc::clone(handle),
                realname: realname.to_owned(),
                token,
            },
        );

        Ok(())
    }

    /// Remove a name
    ///
    /// With `conn` given, the entry is only removed while it still belongs
    /// to that connection, so a superseded connection can never drop the
    /// entry of the one that replaced it.
    pub fn remove_name(&mut self, name: &str, conn: Option<ConnectionId>) {
        let owned = match (self.names.get(name), conn) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(member), Some(id)) => member.handle.id() == id,
        };

        if owned {
            self.names.remove(name);
        }
    }

    /// Send a frame to every member except `except`
    pub fn srv_message(&self, frame: &ServerFrame<'_>, except: Option<ConnectionId>) {
        let text = frame.encode();
        for member in self.names.values() {
            if Some(member.handle.id()) != except {
                member.handle.send(&text);
            }
        }
    }

    /// Send `conn` the display names of all members
    pub fn srv_users(&self, conn: &ConnectionHandle) {
        let frame = ServerFrame::Users {
            server: &self.srvname,
            realnames: self.realnames().collect(),
        };
        conn.send(&frame.encode());
    }

    /// Announce a departing member and drop its entry
    ///
    /// The member is still in the table while `QUIT` goes out, so it gets
    /// its own `QUIT` if its transport is still writable.
    pub(crate) fn depart(&mut self, name: &str, realname: &str, conn: &ConnectionHandle) {
        self.srv_message(&ServerFrame::Quit { realname }, None);
        self.remove_name(name, Some(conn.id()));

        tracing::info!(
            channel = %self.channel,
            name = name,
            conn_id = %conn.id(),
            "Member left"
        );
    }

    /// Run the close sequence of a member on its behalf
    fn evict(&mut self, name: &str, realname: &str, holder: &ConnectionHandle) {
        // Registered connections only go inactive under this lock.
        if holder.deactivate() {
            self.depart(name, realname, holder);
            holder.close_upstream();
        } else {
            self.remove_name(name, Some(holder.id()));
        }
    }
}
