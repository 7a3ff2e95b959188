use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything the surrounding product supplies to run one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Local session identifier, used in logs and the summary.
    pub session_id: String,
    /// WebSocket endpoint of the candidate agent. One endpoint per
    /// (session, participant) pair.
    pub endpoint: String,
    /// Participant label, e.g. "agent-a" in a head-to-head battle.
    pub participant: String,
    /// Scenario name, carried for display only.
    pub scenario: Option<String>,
    /// Hard cap on conversation length; the session ends itself at this point.
    pub max_duration: Duration,
    /// Cadence of the elapsed-time clock.
    pub tick_interval: Duration,
}

impl Default for SessionDescriptor {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", Uuid::new_v4()),
            endpoint: "ws://127.0.0.1:8000/api/v1/battles/local/agent-stream".to_string(),
            participant: "agent-a".to_string(),
            scenario: None,
            max_duration: Duration::from_secs(120),
            tick_interval: Duration::from_millis(100),
        }
    }
}
