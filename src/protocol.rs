//! Wire protocol spoken over the agent WebSocket.
//!
//! Audio travels as raw binary PCM16 frames in both directions. Everything
//! else is a JSON text message discriminated by a `type` tag: the agent side
//! sends [`AgentEvent`]s, the client sends [`ClientCommand`]s. Unknown tags
//! and unparseable payloads are not errors at this layer; callers drop them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Control events the agent side can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// The agent acknowledged the connection and is ready to talk.
    #[serde(rename = "session_started")]
    SessionStarted { session_id: Option<String> },

    /// One conversational turn was transcribed.
    #[serde(rename = "transcript")]
    Transcript {
        #[serde(default)]
        role: TurnRole,
        #[serde(default)]
        text: String,
    },

    /// Barge-in: the user spoke over the agent, drop pending agent audio.
    #[serde(rename = "clear")]
    Clear,

    /// Final summary; the conversation is over. Agents vary in how much of
    /// this they fill in, so every field tolerates absence.
    #[serde(rename = "conversation_ended")]
    ConversationEnded {
        conversation_id: Option<String>,
        #[serde(default)]
        total_turns: u32,
        #[serde(default)]
        duration_seconds: f64,
        #[serde(default)]
        transcript: Vec<TranscriptTurn>,
    },

    /// The agent side declared the conversation timed out.
    #[serde(rename = "timeout")]
    Timeout { message: Option<String> },

    /// Terminal failure on the agent side.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Control messages the client sends. Audio is never wrapped in JSON, so the
/// graceful end request is the only member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "end_conversation")]
    EndConversation,
}

/// Who spoke a transcript turn. Agents label their side inconsistently
/// ("agent", "assistant", "bot"), so parsing goes through a string and any
/// label we do not recognize lands on `Unknown` instead of failing the
/// whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TurnRole {
    User,
    Agent,
    Unknown,
}

impl From<String> for TurnRole {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "user" => TurnRole::User,
            "agent" | "assistant" | "bot" => TurnRole::Agent,
            _ => TurnRole::Unknown,
        }
    }
}

impl Default for TurnRole {
    fn default() -> Self {
        TurnRole::Unknown
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Agent => write!(f, "agent"),
            TurnRole::Unknown => write!(f, "unknown"),
        }
    }
}

/// One turn of the conversation. Agents attach extra bookkeeping fields
/// (timestamps, latencies) which are ignored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    #[serde(default)]
    pub role: TurnRole,
    #[serde(default)]
    pub text: String,
}

/// Parse one inbound text payload. Returns `None` for anything that is not a
/// well-formed control event; callers count and drop those.
pub fn parse_agent_event(raw: &str) -> Option<AgentEvent> {
    serde_json::from_str(raw).ok()
}
