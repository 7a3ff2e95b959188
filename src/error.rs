use thiserror::Error;

/// Failures a conversation session can report before or while running.
///
/// Mid-session terminal causes (transport loss, remote error events) do not
/// surface here; a session that reached `active` always delivers a
/// [`SessionSummary`](crate::session::SessionSummary) whose end reason records
/// what happened. This enum covers everything that prevents a session from
/// becoming active, plus driver-task failures.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The platform refused access to the capture device.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// An audio device could not be opened or configured.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The WebSocket dial to the agent endpoint failed.
    #[error("failed to open agent transport: {0}")]
    TransportOpen(String),

    /// The session driver itself failed (task panic, runtime shutdown).
    #[error("session driver failed: {0}")]
    Internal(String),
}
