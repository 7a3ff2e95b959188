pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{
    AudioChunk, AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureSource,
    MicrophoneBackend, OutputSink, PlaybackScheduler, SpeakerSink, WavFileBackend,
};
pub use config::Config;
pub use error::SessionError;
pub use protocol::{AgentEvent, ClientCommand, TranscriptTurn, TurnRole};
pub use session::{
    ConversationSession, EndReason, SessionController, SessionDescriptor, SessionEvent,
    SessionState, SessionSummary, TranscriptLog,
};
pub use transport::{AgentTransport, ClientMessage, TransportEvent, TransportLink, WsTransport};
