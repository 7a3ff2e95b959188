use std::fmt;

use crate::protocol::TranscriptTurn;
use crate::session::summary::EndReason;

/// Lifecycle of one conversation session. Transitions only ever move
/// forward; `Ended` has no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Capture requested, transport dial in flight.
    Connecting,
    /// Full duplex streaming.
    Active,
    /// Graceful end requested; waiting for the remote summary.
    Ending,
    /// All resources released. Terminal.
    Ended,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Ended)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Ending => write!(f, "ending"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

/// Events broadcast to display layers while a session runs. Slow or absent
/// subscribers never block the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The agent acknowledged the connection.
    Started { session_id: String },
    StateChanged { from: SessionState, to: SessionState },
    /// One transcript turn arrived.
    Turn(TranscriptTurn),
    /// Barge-in: pending agent audio was discarded.
    Interrupted,
    /// A terminal failure, message passed through verbatim.
    Error { message: String },
    /// The session is over; the summary is available from `wait`.
    Ended { reason: EndReason },
}
