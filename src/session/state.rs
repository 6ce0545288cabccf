//! Connection state machine
//!
//! Tracks a connection from accept to close.

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Bound to a channel, no name yet
    Unregistered,
    /// Holding a name in its channel
    Registered,
    /// Closed, either by its transport or by a reclaim of its name
    Closed,
}

impl SessionPhase {
    /// Whether frames from the client are still processed
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionPhase::Closed)
    }

    /// Whether the connection holds a name
    pub fn is_registered(&self) -> bool {
        matches!(self, SessionPhase::Registered)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            SessionPhase::Unregistered => "unregistered",
            SessionPhase::Registered => "registered",
            SessionPhase::Closed => "closed",
        };
        f.write_str(phase)
    }
}
