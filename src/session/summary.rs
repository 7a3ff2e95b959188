use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::TranscriptTurn;

/// How a session reached `ended`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    /// The agent delivered `conversation_ended`.
    Completed,
    /// The agent declared the conversation timed out.
    RemoteTimeout,
    /// The connection closed without a remote summary.
    TransportClosed,
    /// The connection failed mid-session.
    TransportError { message: String },
    /// The agent reported a terminal error.
    RemoteError { message: String },
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Completed => write!(f, "completed"),
            EndReason::RemoteTimeout => write!(f, "remote_timeout"),
            EndReason::TransportClosed => write!(f, "transport_closed"),
            EndReason::TransportError { message } => write!(f, "transport_error: {}", message),
            EndReason::RemoteError { message } => write!(f, "remote_error: {}", message),
        }
    }
}

/// The one summary every session that became active delivers.
///
/// When the agent supplies its own figures in `conversation_ended`, those
/// win; the locally tracked transcript and clock fill whatever the agent
/// left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub participant: String,
    /// Remote conversation id, when the agent delivered one.
    pub conversation_id: Option<String>,
    pub total_turns: usize,
    pub duration_seconds: f64,
    pub transcript: Vec<TranscriptTurn>,
    pub started_at: DateTime<Utc>,
    pub end_reason: EndReason,
}

/// Append-only log of conversational turns, ordered by arrival.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    turns: Vec<TranscriptTurn>,
}

impl TranscriptLog {
    pub fn push(&mut self, turn: TranscriptTurn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<TranscriptTurn> {
        self.turns
    }
}

/// Durations in summaries are rounded to centiseconds, matching the
/// precision the agent side reports.
pub(crate) fn round_to_centis(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
