//! Conversation session management
//!
//! This module provides the `ConversationSession` abstraction that manages:
//! - Audio capture and PCM16 streaming to the agent
//! - FIFO playback of agent audio with barge-in handling
//! - Control event dispatch (transcripts, clear, remote end)
//! - The session lifecycle state machine and ordered teardown
//! - The end-of-session summary

mod descriptor;
mod events;
mod session;
mod summary;

pub use descriptor::SessionDescriptor;
pub use events::{SessionEvent, SessionState};
pub use session::{ConversationSession, SessionController};
pub use summary::{EndReason, SessionSummary, TranscriptLog};
