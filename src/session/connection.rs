//! Per-client connection
//!
//! A [`Connection`] is the hub-side state of one client session: which
//! channel it belongs to, which name it holds, and whether it is still open.
//! The transport feeds it raw frames through [`Connection::message`] and
//! reports disconnection through [`Connection::close`].

use std::sync::Arc;

use super::dispatch;
use super::state::SessionPhase;
use super::upstream::{ConnectionHandle, ConnectionId, Upstream};
use crate::protocol::{parse_frame, Arg, ServerFrame};
use crate::registry::{Channel, Roster, Token};

/// Longest accepted display name, in characters
pub const MAX_NAME_LEN: usize = 32;

/// Hub-side state of one client session
pub struct Connection {
    id: ConnectionId,

    /// Released on close
    handle: Option<Arc<ConnectionHandle>>,

    /// Released on close
    channel: Option<Arc<Channel>>,

    /// Canonical (lowercase) name, once registered
    name: Option<String>,

    /// Name as submitted, once registered
    realname: Option<String>,

    srvname: Arc<str>,
}

impl Connection {
    pub(crate) fn new(channel: Arc<Channel>, srvname: Arc<str>, upstream: Arc<dyn Upstream>) -> Self {
        let handle = Arc::new(ConnectionHandle::new(upstream));
        Self {
            id: handle.id(),
            handle: Some(handle),
            channel: Some(channel),
            name: None,
            realname: None,
            srvname,
        }
    }

    /// Connection identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        match &self.handle {
            Some(handle) if handle.is_active() => {
                if self.realname.is_some() {
                    SessionPhase::Registered
                } else {
                    SessionPhase::Unregistered
                }
            }
            _ => SessionPhase::Closed,
        }
    }

    /// Whether the connection is still open
    pub fn is_active(&self) -> bool {
        self.phase().is_open()
    }

    /// Canonical name, once registered
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Display name, once registered
    pub fn realname(&self) -> Option<&str> {
        self.realname.as_deref()
    }

    /// Name of the channel this connection is bound to, until closed
    pub fn channel_name(&self) -> Option<&str> {
        self.channel.as_deref().map(Channel::name)
    }

    /// Handle one raw frame from the client
    ///
    /// Malformed frames, unknown commands and wrong argument counts are
    /// dropped without a reply. Frames arriving after close are ignored.
    pub async fn message(&mut self, raw: &str) {
        let Some(frame) = parse_frame(raw) else {
            tracing::debug!(conn_id = %self.id, "Dropped malformed frame");
            return;
        };

        let Some(handler) = dispatch::lookup(&frame.command) else {
            tracing::debug!(conn_id = %self.id, command = %frame.command, "Dropped unknown command");
            return;
        };

        if !handler.arity.accepts(frame.args.len()) {
            tracing::debug!(
                conn_id = %self.id,
                command = handler.name,
                args = frame.args.len(),
                "Dropped command with wrong argument count"
            );
            return;
        }

        let Some(channel) = self.channel.clone() else {
            return;
        };
        let mut roster = channel.lock().await;

        // A reclaim of our name may have closed us while we waited.
        if !self.is_active() {
            return;
        }

        (handler.run)(self, &mut *roster, frame.args);
    }

    /// Close the connection
    ///
    /// The first call announces `QUIT` for a registered connection, releases
    /// its name and closes the upstream. Later calls, and calls on a
    /// connection already closed by a reclaim of its name, do nothing.
    pub async fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let channel = self.channel.take();

        let first = match (channel, self.name.as_deref(), self.realname.as_deref()) {
            (Some(channel), Some(name), Some(realname)) => {
                let mut roster = channel.lock().await;
                let first = handle.deactivate();
                if first {
                    roster.depart(name, realname, &handle);
                }
                first
            }
            _ => handle.deactivate(),
        };

        if first {
            handle.close_upstream();
            tracing::debug!(conn_id = %self.id, "Connection closed");
        }
    }

    /// Send a frame to this client only
    fn srv_message(&self, frame: &ServerFrame<'_>) {
        if let Some(handle) = &self.handle {
            handle.send(&frame.encode());
        }
    }

    /// `ECHO text`
    pub(crate) fn usr_echo(&mut self, _roster: &mut Roster, args: Vec<Arg>) {
        let Some(Arg::Str(text)) = args.into_iter().next() else {
            return;
        };

        self.srv_message(&ServerFrame::Echo {
            server: &self.srvname,
            text: &text,
        });
    }

    /// `REGISTER name [token]`
    pub(crate) fn usr_register(&mut self, roster: &mut Roster, args: Vec<Arg>) {
        if self.phase().is_registered() {
            return;
        }

        let mut args = args.into_iter();
        let Some(Arg::Str(realname)) = args.next() else {
            return;
        };
        if !is_valid_name(&realname) {
            return;
        }
        let old_token = args.next();
        let old_token = old_token.as_ref().and_then(Arg::as_str);

        let Some(handle) = self.handle.clone() else {
            return;
        };

        let name = realname.to_lowercase();
        let token = Token::generate();
        let token_text = token.as_str().to_owned();

        if roster
            .add_name(&name, &realname, &handle, token, old_token)
            .is_err()
        {
            self.srv_message(&ServerFrame::NameInUse {
                server: &self.srvname,
            });
            return;
        }

        tracing::info!(
            channel = self.channel_name().unwrap_or_default(),
            conn_id = %self.id,
            name = %realname,
            reclaimed = old_token.is_some(),
            "Registered"
        );

        roster.srv_message(
            &ServerFrame::Joined {
                server: &self.srvname,
                realname: &realname,
            },
            Some(self.id),
        );
        self.srv_message(&ServerFrame::Registered {
            server: &self.srvname,
            realname: &realname,
            token: &token_text,
        });
        roster.srv_users(&handle);

        self.name = Some(name);
        self.realname = Some(realname);
    }

    /// `LOCATION lat lng`
    pub(crate) fn usr_location(&mut self, roster: &mut Roster, args: Vec<Arg>) {
        let Some(realname) = self.realname.as_deref() else {
            return;
        };
        let (Some(lat), Some(lng)) = (
            args.first().and_then(Arg::as_number),
            args.get(1).and_then(Arg::as_number),
        ) else {
            return;
        };

        roster.srv_message(&ServerFrame::Location { realname, lat, lng }, None);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("channel", &self.channel_name())
            .field("realname", &self.realname)
            .field("phase", &self.phase())
            .finish()
    }
}

/// 1 to 32 word characters or spaces
///
/// Word characters are Unicode alphabetic or numeric characters plus `_`.
/// Alphabetic includes combining vowel signs and similar marks.
fn is_valid_name(name: &str) -> bool {
    let count = name.chars().count();
    (1..=MAX_NAME_LEN).contains(&count)
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ' ')
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::registry::ChannelRegistry;
    use crate::session::recording::RecordingUpstream;

    struct Client {
        conn: Connection,
        upstream: Arc<RecordingUpstream>,
    }

    impl Client {
        async fn join(registry: &ChannelRegistry, channel: &str) -> Self {
            let upstream = Arc::new(RecordingUpstream::default());
            let conn = registry.connection(channel, upstream.clone()).await.unwrap();
            Self { conn, upstream }
        }

        async fn send(&mut self, frame: &str) {
            self.conn.message(frame).await;
        }

        async fn register(&mut self, name: &str) -> String {
            self.send(&json!(["REGISTER", name]).to_string()).await;
            let frames = self.upstream.take();
            frames[0][3].as_str().unwrap().to_owned()
        }

        fn frames(&self) -> Vec<Value> {
            self.upstream.take()
        }
    }

    fn sorted_users(frame: &Value) -> Vec<String> {
        let items = frame.as_array().unwrap();
        assert_eq!(items[1], "USERS");
        let mut names: Vec<String> = items[2..]
            .iter()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("Alice"));
        assert!(is_valid_name("Alice Smith_2"));
        assert!(is_valid_name("Zoë"));
        assert!(is_valid_name(&"x".repeat(32)));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(&"x".repeat(33)));
        assert!(!is_valid_name("alice!"));
        assert!(!is_valid_name("alice\n"));
        assert!(!is_valid_name("alice\tbob"));
    }

    #[test]
    fn test_name_uses_unicode_alphabetic() {
        assert!(is_valid_name("李雷"));
        assert!(is_valid_name("Ωmega 42"));
        // Vowel signs are alphabetic, so combined syllables are accepted
        assert!(is_valid_name("कि"));
        assert!(!is_valid_name("a\u{00a0}b"));
    }

    #[tokio::test]
    async fn test_echo_only_to_caller() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        b.register("Bob").await;

        a.send(r#"["echo", "hello"]"#).await;

        assert_eq!(a.frames(), vec![json!(["srv", "ECHO", "hello"])]);
        assert!(b.frames().is_empty());
    }

    #[tokio::test]
    async fn test_echo_requires_string() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;

        a.send(r#"["ECHO", 42]"#).await;
        a.send(r#"["ECHO"]"#).await;
        a.send(r#"["ECHO", "a", "b"]"#).await;

        assert!(a.frames().is_empty());
    }

    #[tokio::test]
    async fn test_register_free_name() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;

        a.send(r#"["REGISTER", "Alice"]"#).await;

        let frames = a.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], "srv");
        assert_eq!(frames[0][1], "REGISTER");
        assert_eq!(frames[0][2], "Alice");
        assert_eq!(frames[0][3].as_str().unwrap().len(), 64);
        assert_eq!(frames[1], json!(["srv", "USERS", "Alice"]));

        assert_eq!(a.conn.phase(), SessionPhase::Registered);
        assert_eq!(a.conn.name(), Some("alice"));
        assert_eq!(a.conn.realname(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_register_announces_to_others() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        let mut other = Client::join(&registry, "room2").await;
        a.register("Alice").await;
        other.register("Olga").await;

        b.send(r#"["REGISTER", "Bob"]"#).await;

        assert_eq!(a.frames(), vec![json!(["srv", "REGISTER", "Bob"])]);
        assert!(other.frames().is_empty());

        let frames = b.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][2], "Bob");
        assert_eq!(sorted_users(&frames[1]), vec!["Alice", "Bob"]);
    }

    #[tokio::test]
    async fn test_register_twice_is_noop() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        a.register("Alice").await;

        a.send(r#"["REGISTER", "Alicia"]"#).await;

        assert!(a.frames().is_empty());
        assert_eq!(a.conn.realname(), Some("Alice"));
        let stats = registry.channel_stats("room1").await.unwrap();
        assert_eq!(stats.realnames, vec!["Alice".to_string()]);
    }

    #[tokio::test]
    async fn test_register_invalid_name_dropped() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;

        a.send(r#"["REGISTER", "bad-name"]"#).await;
        a.send(r#"["REGISTER", ""]"#).await;
        a.send(r#"["REGISTER", 7]"#).await;
        a.send(r#"["REGISTER"]"#).await;
        a.send(r#"["REGISTER", "a", "b", "c"]"#).await;

        assert!(a.frames().is_empty());
        assert_eq!(a.conn.phase(), SessionPhase::Unregistered);
    }

    #[tokio::test]
    async fn test_name_collision_case_insensitive() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        a.register("Alice").await;

        b.send(r#"["REGISTER", "ALICE"]"#).await;
        b.send(r#"["REGISTER", "alice", "not-the-token"]"#).await;
        b.send(r#"["REGISTER", "alice", 12345]"#).await;

        let error = json!(["srv", "ERROR", 433, "Name already in use."]);
        assert_eq!(b.frames(), vec![error.clone(), error.clone(), error]);
        assert_eq!(b.conn.phase(), SessionPhase::Unregistered);

        assert!(a.frames().is_empty());
        assert_eq!(a.conn.phase(), SessionPhase::Registered);
        assert!(!a.upstream.is_closed());
    }

    #[tokio::test]
    async fn test_same_name_in_different_channels() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room2").await;

        a.register("Alice").await;
        b.send(r#"["REGISTER", "Alice"]"#).await;

        assert_eq!(b.frames()[0][1], "REGISTER");
        assert_eq!(b.conn.phase(), SessionPhase::Registered);
    }

    #[tokio::test]
    async fn test_reclaim_scenario() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        let mut c = Client::join(&registry, "room1").await;
        c.register("Carol").await;

        a.send(r#"["REGISTER", "Alice"]"#).await;
        let frames = a.frames();
        let t1 = frames[0][3].as_str().unwrap().to_owned();
        assert_eq!(sorted_users(&frames[1]), vec!["Alice", "Carol"]);
        assert_eq!(c.frames(), vec![json!(["srv", "REGISTER", "Alice"])]);

        b.send(r#"["REGISTER", "Alice"]"#).await;
        assert_eq!(b.frames(), vec![json!(["srv", "ERROR", 433, "Name already in use."])]);
        assert!(a.frames().is_empty());

        b.send(&json!(["REGISTER", "Alice", t1]).to_string()).await;

        // Old holder sees its own QUIT and is closed
        assert_eq!(a.frames(), vec![json!(["Alice", "QUIT"])]);
        assert_eq!(a.upstream.close_count(), 1);
        assert_eq!(a.conn.phase(), SessionPhase::Closed);

        // Rest of the channel sees QUIT before the new REGISTER
        assert_eq!(
            c.frames(),
            vec![json!(["Alice", "QUIT"]), json!(["srv", "REGISTER", "Alice"])]
        );

        let frames = b.frames();
        assert_eq!(frames.len(), 2);
        let t2 = frames[0][3].as_str().unwrap();
        assert_ne!(t2, t1);
        assert_eq!(sorted_users(&frames[1]), vec!["Alice", "Carol"]);
        assert_eq!(b.conn.phase(), SessionPhase::Registered);

        // The evicted connection's own close is a no-op
        a.conn.close().await;
        assert!(c.frames().is_empty());
        assert!(b.frames().is_empty());
        assert_eq!(a.upstream.close_count(), 1);
        let stats = registry.channel_stats("room1").await.unwrap();
        assert_eq!(stats.members, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_register_single_winner() {
        let registry = Arc::new(ChannelRegistry::new("srv"));

        for _ in 0..20 {
            let mut tasks = Vec::new();
            for _ in 0..16 {
                let registry = Arc::clone(&registry);
                tasks.push(tokio::spawn(async move {
                    let upstream = Arc::new(RecordingUpstream::default());
                    let mut conn = registry.connection("race", upstream.clone()).await.unwrap();
                    conn.message(r#"["REGISTER", "Alice"]"#).await;
                    Client { conn, upstream }
                }));
            }

            let mut clients = Vec::new();
            for task in tasks {
                clients.push(task.await.unwrap());
            }

            let winners = clients
                .iter()
                .filter(|c| c.conn.phase() == SessionPhase::Registered)
                .count();
            assert_eq!(winners, 1);

            let stats = registry.channel_stats("race").await.unwrap();
            assert_eq!(stats.members, 1);

            for mut client in clients {
                let registered = client.conn.phase() == SessionPhase::Registered;
                let frames = client.frames();
                if !registered {
                    assert_eq!(frames, vec![json!(["srv", "ERROR", 433, "Name already in use."])]);
                }
                client.conn.close().await;
            }
            assert_eq!(registry.channel_stats("race").await.unwrap().members, 0);
        }
    }

    #[tokio::test]
    async fn test_evicted_connection_ignores_frames() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        let t1 = a.register("Alice").await;

        b.send(&json!(["REGISTER", "Alice", t1]).to_string()).await;
        a.frames();
        b.frames();

        a.send(r#"["LOCATION", 1, 2]"#).await;
        a.send(r#"["ECHO", "still here?"]"#).await;

        assert!(a.frames().is_empty());
        assert!(b.frames().is_empty());
    }

    #[tokio::test]
    async fn test_location_broadcast_includes_sender() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        let mut idle = Client::join(&registry, "room1").await;
        a.register("Alice").await;
        b.register("Bob").await;
        a.frames();

        a.send(r#"["LOCATION", 12.3, 45.6]"#).await;

        let expected = vec![json!(["Alice", "LOCATION", 12.3, 45.6])];
        assert_eq!(a.frames(), expected);
        assert_eq!(b.frames(), expected);
        // Unregistered connections are not channel members
        assert!(idle.frames().is_empty());

        idle.send(r#"["LOCATION", 1, 2]"#).await;
        assert!(a.frames().is_empty());
    }

    #[tokio::test]
    async fn test_location_before_register_dropped() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        b.register("Bob").await;

        a.send(r#"["LOCATION", 12.3, 45.6]"#).await;

        assert!(a.frames().is_empty());
        assert!(b.frames().is_empty());
    }

    #[tokio::test]
    async fn test_location_requires_numbers() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        a.register("Alice").await;

        a.send(r#"["LOCATION", "12.3", 45.6]"#).await;
        a.send(r#"["LOCATION", 12.3]"#).await;
        a.send(r#"["LOCATION", 1, 2, 3]"#).await;

        assert!(a.frames().is_empty());

        a.send(r#"["location", -7, 0.5]"#).await;
        assert_eq!(a.frames(), vec![json!(["Alice", "LOCATION", -7, 0.5])]);
    }

    #[tokio::test]
    async fn test_malformed_frames_dropped() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        a.register("Alice").await;

        for raw in ["not json", "[]", "[123]", r#"["NOPE", 1]"#, r#"{"a":1}"#, ""] {
            a.send(raw).await;
        }

        assert!(a.frames().is_empty());
        assert!(!a.upstream.is_closed());
        assert_eq!(a.conn.phase(), SessionPhase::Registered);
    }

    #[tokio::test]
    async fn test_close_registered() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        a.register("Alice").await;
        b.register("Bob").await;
        a.frames();

        a.conn.close().await;

        assert_eq!(b.frames(), vec![json!(["Alice", "QUIT"])]);
        assert_eq!(a.frames(), vec![json!(["Alice", "QUIT"])]);
        assert_eq!(a.upstream.close_count(), 1);
        assert_eq!(a.conn.phase(), SessionPhase::Closed);
        assert_eq!(a.conn.channel_name(), None);

        // Name is free again
        let mut c = Client::join(&registry, "room1").await;
        c.send(r#"["REGISTER", "alice"]"#).await;
        assert_eq!(c.frames()[0][1], "REGISTER");
    }

    #[tokio::test]
    async fn test_double_close() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        a.register("Alice").await;
        b.register("Bob").await;
        b.frames();

        a.conn.close().await;
        a.conn.close().await;

        assert_eq!(b.frames(), vec![json!(["Alice", "QUIT"])]);
        assert_eq!(a.upstream.close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_unregistered() {
        let registry = ChannelRegistry::new("srv");
        let mut a = Client::join(&registry, "room1").await;
        let mut b = Client::join(&registry, "room1").await;
        b.register("Bob").await;

        a.conn.close().await;

        assert!(b.frames().is_empty());
        assert!(a.frames().is_empty());
        assert_eq!(a.upstream.close_count(), 1);
        assert_eq!(a.conn.phase(), SessionPhase::Closed);

        a.send(r#"["ECHO", "hi"]"#).await;
        assert!(a.frames().is_empty());
    }

    #[test]
    fn test_close_from_blocking_context() {
        tokio_test::block_on(async {
            let registry = ChannelRegistry::new("srv");
            let mut a = Client::join(&registry, "room1").await;
            a.register("Alice").await;

            a.conn.close().await;

            assert_eq!(registry.channel_stats("room1").await.unwrap().members, 0);
        });
    }
}
