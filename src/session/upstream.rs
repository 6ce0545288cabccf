//! Transport-facing sink and connection handles
//!
//! The transport owns the socket. The hub only ever sees it through
//! [`Upstream`], and channel tables only ever see a connection through a
//! [`ConnectionHandle`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Outbound side of a client transport session
///
/// Implementations must not block: both calls are made while a channel is
/// locked. Frames sent after `close` may be discarded.
pub trait Upstream: Send + Sync {
    /// Queue one text frame for the client
    fn send(&self, frame: &str);

    /// Close the transport session
    fn close(&self);
}

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-owning view of a connection held in a channel's name table
///
/// Carries what a channel needs to reach and tear down a member: identity,
/// the upstream, and the liveness flag that makes close idempotent.
pub struct ConnectionHandle {
    id: ConnectionId,
    active: AtomicBool,
    upstream: Arc<dyn Upstream>,
}

impl ConnectionHandle {
    pub(crate) fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self {
            id: ConnectionId::next(),
            active: AtomicBool::new(true),
            upstream,
        }
    }

    /// Connection identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the connection has not been closed yet
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flip to inactive
    ///
    /// Returns true for the one caller that performed the transition.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn send(&self, frame: &str) {
        self.upstream.send(frame);
    }

    pub(crate) fn close_upstream(&self) {
        self.upstream.close();
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
