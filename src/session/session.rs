use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::audio::pcm;
use crate::audio::{AudioChunk, AudioFrame, CaptureBackend, OutputSink, PlaybackScheduler};
use crate::error::SessionError;
use crate::protocol::{self, AgentEvent, ClientCommand, TranscriptTurn};
use crate::session::descriptor::SessionDescriptor;
use crate::session::events::{SessionEvent, SessionState};
use crate::session::summary::{round_to_centis, EndReason, SessionSummary, TranscriptLog};
use crate::transport::{AgentTransport, ClientMessage, TransportEvent, TransportLink};

/// Commands a [`SessionController`] can issue to the driver task.
#[derive(Debug)]
enum SessionCommand {
    End,
    SetMuted(bool),
}

/// How the driver loop decided the conversation was over.
enum LoopOutcome {
    Remote(RemoteEnd),
    RemoteTimeout,
    Closed,
    TransportError(String),
    RemoteError(String),
}

/// Fields carried by the remote `conversation_ended` event.
struct RemoteEnd {
    conversation_id: Option<String>,
    total_turns: u32,
    duration_seconds: f64,
    transcript: Vec<TranscriptTurn>,
}

/// One live conversation with a candidate agent.
///
/// All mutable session state lives in a single driver task; this handle only
/// carries channels into it. `start` returns immediately with the session in
/// `connecting`; [`wait`](ConversationSession::wait) joins the driver and
/// yields the summary, or the error that kept the session from ever becoming
/// active.
pub struct ConversationSession {
    descriptor: SessionDescriptor,
    cmd_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
    driver: JoinHandle<Result<SessionSummary, SessionError>>,
}

impl ConversationSession {
    /// Spawn the driver task and begin connecting.
    pub fn start(
        descriptor: SessionDescriptor,
        capture: Box<dyn CaptureBackend>,
        sink: Box<dyn OutputSink>,
        transport: Box<dyn AgentTransport>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _) = broadcast::channel(64);
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let driver = SessionDriver {
            descriptor: descriptor.clone(),
            state: SessionState::Connecting,
            state_tx,
            event_tx: event_tx.clone(),
            transcript: TranscriptLog::default(),
            muted: false,
            malformed_controls: 0,
            dropped_frames: 0,
        };
        let handle = tokio::spawn(driver.run(capture, sink, transport, cmd_rx));

        Self {
            descriptor,
            cmd_tx,
            event_tx,
            state_rx,
            driver: handle,
        }
    }

    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle transitions. Note that a watch channel coalesces;
    /// subscribe to events for the full transition history.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Subscribe to session events. Only events emitted after the call are
    /// delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// A cloneable handle for ending and muting the session.
    pub fn controller(&self) -> SessionController {
        SessionController {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Join the driver and return the summary. A session that never became
    /// active returns the error that stopped it instead.
    pub async fn wait(self) -> Result<SessionSummary, SessionError> {
        match self.driver.await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Internal(format!(
                "session driver panicked: {}",
                e
            ))),
        }
    }
}

/// Control handle detached from the session's lifetime. Commands sent after
/// the session ended are silently dropped, which makes `end` idempotent.
#[derive(Clone)]
pub struct SessionController {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionController {
    /// Request a graceful end. Safe to call any number of times.
    pub async fn end(&self) {
        let _ = self.cmd_tx.send(SessionCommand::End).await;
    }

    /// Gate outbound audio without releasing the capture device.
    pub async fn set_muted(&self, muted: bool) {
        let _ = self.cmd_tx.send(SessionCommand::SetMuted(muted)).await;
    }
}

struct SessionDriver {
    descriptor: SessionDescriptor,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<SessionEvent>,
    transcript: TranscriptLog,
    muted: bool,
    malformed_controls: u64,
    dropped_frames: u64,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut capture: Box<dyn CaptureBackend>,
        sink: Box<dyn OutputSink>,
        transport: Box<dyn AgentTransport>,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
    ) -> Result<SessionSummary, SessionError> {
        info!(
            "Session {} ({}) dialing {} via {}",
            self.descriptor.session_id,
            self.descriptor.participant,
            self.descriptor.endpoint,
            transport.name()
        );

        let mut frames = match capture.acquire().await {
            Ok(rx) => rx,
            Err(e) => {
                self.fail_before_active(&e);
                return Err(e);
            }
        };
        debug!(
            "Session {} capture ready ({})",
            self.descriptor.session_id,
            capture.name()
        );

        let link = match transport.open(&self.descriptor).await {
            Ok(link) => link,
            Err(e) => {
                if let Err(release_err) = capture.release().await {
                    warn!("Failed to release capture device: {}", release_err);
                }
                self.fail_before_active(&e);
                return Err(e);
            }
        };

        let (done_tx, mut done_rx) = mpsc::channel(32);
        let mut scheduler = PlaybackScheduler::new(sink);
        if let Err(e) = scheduler.open(done_tx).await {
            if let Err(release_err) = capture.release().await {
                warn!("Failed to release capture device: {}", release_err);
            }
            drop(link);
            self.fail_before_active(&e);
            return Err(e);
        }

        let TransportLink {
            outbound,
            mut inbound,
        } = link;

        self.set_state(SessionState::Active);
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            "Session {} ({}) active, max duration {:?}",
            self.descriptor.session_id, self.descriptor.participant, self.descriptor.max_duration
        );

        let mut tick = tokio::time::interval(self.descriptor.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut capture_open = true;

        let outcome = loop {
            tokio::select! {
                maybe_frame = frames.recv(), if capture_open => match maybe_frame {
                    Some(frame) => self.handle_frame(frame, &outbound),
                    None => {
                        debug!("Session {} capture stream ended", self.descriptor.session_id);
                        capture_open = false;
                    }
                },
                maybe_event = inbound.recv() => match maybe_event {
                    Some(TransportEvent::Binary(bytes)) => {
                        let chunk = AudioChunk { samples: pcm::decode(&bytes) };
                        scheduler.enqueue(chunk).await;
                    }
                    Some(TransportEvent::Text(raw)) => {
                        if let Some(outcome) = self.handle_control(&raw, &mut scheduler).await {
                            break outcome;
                        }
                    }
                    Some(TransportEvent::Error(message)) => break LoopOutcome::TransportError(message),
                    Some(TransportEvent::Closed) | None => break LoopOutcome::Closed,
                },
                Some(command) = cmd_rx.recv() => match command {
                    SessionCommand::End => self.request_end(&outbound).await,
                    SessionCommand::SetMuted(muted) => {
                        self.muted = muted;
                        debug!("Session {} mute set to {}", self.descriptor.session_id, muted);
                    }
                },
                Some(()) = done_rx.recv() => scheduler.on_playback_complete().await,
                _ = tick.tick() => {
                    if self.state == SessionState::Active
                        && started.elapsed() >= self.descriptor.max_duration
                    {
                        info!(
                            "Session {} reached max duration, requesting end",
                            self.descriptor.session_id
                        );
                        self.request_end(&outbound).await;
                    }
                }
            }
        };

        // Teardown happens exactly once, in a fixed order: clock, capture
        // device, output device, transport.
        drop(tick);
        if let Err(e) = capture.release().await {
            warn!("Failed to release capture device: {}", e);
        }
        scheduler.close().await;
        drop(outbound);
        drop(inbound);

        if self.malformed_controls > 0 {
            debug!(
                "Session {} ignored {} malformed control messages",
                self.descriptor.session_id, self.malformed_controls
            );
        }
        if self.dropped_frames > 0 {
            debug!(
                "Session {} dropped {} outbound frames under backpressure",
                self.descriptor.session_id, self.dropped_frames
            );
        }

        Ok(self.finish(outcome, started_at, started.elapsed().as_secs_f64()))
    }

    /// Encode and ship one captured frame, unless gated.
    fn handle_frame(&mut self, frame: AudioFrame, outbound: &mpsc::Sender<ClientMessage>) {
        if self.state != SessionState::Active || self.muted {
            return;
        }
        let encoded = pcm::encode(&frame.samples);
        match outbound.try_send(ClientMessage::Audio(encoded)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Stale audio is worthless; drop rather than stall the loop.
                self.dropped_frames += 1;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // The transport will deliver its close event shortly.
            }
        }
    }

    /// Dispatch one inbound control payload. Returns the loop outcome when the
    /// event is terminal.
    async fn handle_control(
        &mut self,
        raw: &str,
        scheduler: &mut PlaybackScheduler,
    ) -> Option<LoopOutcome> {
        let event = match protocol::parse_agent_event(raw) {
            Some(event) => event,
            None => {
                self.malformed_controls += 1;
                debug!(
                    "Session {} ignoring malformed control message",
                    self.descriptor.session_id
                );
                return None;
            }
        };

        match event {
            AgentEvent::SessionStarted { session_id } => {
                let session_id = session_id.unwrap_or_default();
                info!(
                    "Session {} acknowledged by agent as {}",
                    self.descriptor.session_id, session_id
                );
                self.emit(SessionEvent::Started { session_id });
                None
            }
            AgentEvent::Transcript { role, text } => {
                let turn = TranscriptTurn { role, text };
                self.transcript.push(turn.clone());
                debug!(
                    "Session {} turn {}: [{}] {}",
                    self.descriptor.session_id,
                    self.transcript.len(),
                    turn.role,
                    turn.text
                );
                self.emit(SessionEvent::Turn(turn));
                None
            }
            AgentEvent::Clear => {
                let discarded = scheduler.interrupt();
                debug!(
                    "Session {} barge-in: discarded {} pending chunks",
                    self.descriptor.session_id, discarded
                );
                self.emit(SessionEvent::Interrupted);
                None
            }
            AgentEvent::ConversationEnded {
                conversation_id,
                total_turns,
                duration_seconds,
                transcript,
            } => Some(LoopOutcome::Remote(RemoteEnd {
                conversation_id,
                total_turns,
                duration_seconds,
                transcript,
            })),
            AgentEvent::Timeout { message } => {
                info!(
                    "Session {} timed out remotely: {}",
                    self.descriptor.session_id,
                    message.as_deref().unwrap_or("no detail")
                );
                Some(LoopOutcome::RemoteTimeout)
            }
            AgentEvent::Error { message } => Some(LoopOutcome::RemoteError(message)),
        }
    }

    /// Move to `ending` and tell the agent to wrap up. A session already
    /// ending (or past it) ignores the request.
    async fn request_end(&mut self, outbound: &mpsc::Sender<ClientMessage>) {
        if self.state != SessionState::Active {
            return;
        }
        self.set_state(SessionState::Ending);
        info!(
            "Session {} ending, waiting for the agent to wrap up",
            self.descriptor.session_id
        );
        if outbound
            .send(ClientMessage::Control(ClientCommand::EndConversation))
            .await
            .is_err()
        {
            debug!(
                "Session {} could not send end_conversation: transport already closed",
                self.descriptor.session_id
            );
        }
    }

    /// Build the summary and publish the terminal events.
    fn finish(
        &mut self,
        outcome: LoopOutcome,
        started_at: DateTime<Utc>,
        elapsed_seconds: f64,
    ) -> SessionSummary {
        let (reason, remote) = match outcome {
            LoopOutcome::Remote(end) => (EndReason::Completed, Some(end)),
            LoopOutcome::RemoteTimeout => (EndReason::RemoteTimeout, None),
            LoopOutcome::Closed => (EndReason::TransportClosed, None),
            LoopOutcome::TransportError(message) => (EndReason::TransportError { message }, None),
            LoopOutcome::RemoteError(message) => (EndReason::RemoteError { message }, None),
        };

        if let EndReason::TransportError { message } | EndReason::RemoteError { message } = &reason
        {
            error!("Session {} failed: {}", self.descriptor.session_id, message);
            self.emit(SessionEvent::Error {
                message: message.clone(),
            });
        }

        let local_duration = round_to_centis(elapsed_seconds);
        let local_turns = std::mem::take(&mut self.transcript).into_turns();
        let (conversation_id, transcript, total_turns, duration_seconds) = match remote {
            Some(end) => {
                let transcript = if end.transcript.is_empty() {
                    local_turns
                } else {
                    end.transcript
                };
                let total_turns = if end.total_turns > 0 {
                    end.total_turns as usize
                } else {
                    transcript.len()
                };
                let duration = if end.duration_seconds > 0.0 {
                    round_to_centis(end.duration_seconds)
                } else {
                    local_duration
                };
                (end.conversation_id, transcript, total_turns, duration)
            }
            None => {
                let total_turns = local_turns.len();
                (None, local_turns, total_turns, local_duration)
            }
        };

        self.set_state(SessionState::Ended);
        self.emit(SessionEvent::Ended {
            reason: reason.clone(),
        });
        info!(
            "Session {} ({}) ended: {} ({} turns, {:.2}s)",
            self.descriptor.session_id,
            self.descriptor.participant,
            reason,
            total_turns,
            duration_seconds
        );

        SessionSummary {
            session_id: self.descriptor.session_id.clone(),
            participant: self.descriptor.participant.clone(),
            conversation_id,
            total_turns,
            duration_seconds,
            transcript,
            started_at,
            end_reason: reason,
        }
    }

    /// Failure while still connecting: report once and go straight to `ended`.
    /// Nothing was streaming, so there is no summary to deliver.
    fn fail_before_active(&mut self, error: &SessionError) {
        error!(
            "Session {} ({}) failed before becoming active: {}",
            self.descriptor.session_id, self.descriptor.participant, error
        );
        self.emit(SessionEvent::Error {
            message: error.to_string(),
        });
        self.set_state(SessionState::Ended);
    }

    fn set_state(&mut self, next: SessionState) {
        // The lifecycle is strictly forward; anything else is a no-op.
        if next <= self.state {
            return;
        }
        let from = self.state;
        self.state = next;
        let _ = self.state_tx.send(next);
        self.emit(SessionEvent::StateChanged { from, to: next });
    }

    fn emit(&self, event: SessionEvent) {
        // Errors only mean nobody is subscribed right now.
        let _ = self.event_tx.send(event);
    }
}
