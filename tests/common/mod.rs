// In-process fakes for driving a session without real devices or sockets.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_live::audio::{AudioChunk, AudioFrame, CaptureBackend, OutputSink};
use arena_live::transport::{AgentTransport, ClientMessage, TransportEvent, TransportLink};
use arena_live::{
    ConversationSession, SessionDescriptor, SessionError, SessionEvent, SessionState,
};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};

const DEADLINE: Duration = Duration::from_secs(30);

/// Capture backend fed by the test through a channel.
pub struct ChannelCapture {
    rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    acquires: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

/// Counters shared with a [`ChannelCapture`].
pub struct CaptureProbe {
    acquires: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ChannelCapture {
    pub fn new() -> (Self, mpsc::Sender<AudioFrame>, CaptureProbe) {
        let (frame_tx, frame_rx) = mpsc::channel(100);
        let acquires = Arc::new(AtomicUsize::new(0));
        let releases = Arc::new(AtomicUsize::new(0));
        let probe = CaptureProbe {
            acquires: acquires.clone(),
            releases: releases.clone(),
        };
        let capture = Self {
            rx: Mutex::new(Some(frame_rx)),
            acquires,
            releases,
        };
        (capture, frame_tx, probe)
    }
}

impl CaptureProbe {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureBackend for ChannelCapture {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, SessionError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.rx.lock().unwrap().take().ok_or_else(|| {
            SessionError::DeviceUnavailable("channel capture already acquired".to_string())
        })
    }

    async fn release(&mut self) -> Result<(), SessionError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.rx.lock().unwrap().is_none()
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Capture backend whose acquisition always fails.
pub struct FailingCapture;

#[async_trait]
impl CaptureBackend for FailingCapture {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, SessionError> {
        Err(SessionError::DeviceUnavailable(
            "no capture device in tests".to_string(),
        ))
    }

    async fn release(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Output sink that records begun chunks; the test fires completions.
pub struct RecordingSink {
    begun: Arc<Mutex<Vec<AudioChunk>>>,
    done_tx: Arc<Mutex<Option<mpsc::Sender<()>>>>,
    closes: Arc<AtomicUsize>,
}

/// Shared view into a [`RecordingSink`].
pub struct SinkProbe {
    begun: Arc<Mutex<Vec<AudioChunk>>>,
    done_tx: Arc<Mutex<Option<mpsc::Sender<()>>>>,
    closes: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn new() -> (Self, SinkProbe) {
        let begun = Arc::new(Mutex::new(Vec::new()));
        let done_tx = Arc::new(Mutex::new(None));
        let closes = Arc::new(AtomicUsize::new(0));
        let probe = SinkProbe {
            begun: begun.clone(),
            done_tx: done_tx.clone(),
            closes: closes.clone(),
        };
        let sink = Self {
            begun,
            done_tx,
            closes,
        };
        (sink, probe)
    }
}

impl SinkProbe {
    pub fn begun(&self) -> Vec<AudioChunk> {
        self.begun.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Signal that the chunk currently sounding has finished.
    pub async fn complete_one(&self) {
        let done_tx = self.done_tx.lock().unwrap().clone();
        if let Some(tx) = done_tx {
            let _ = tx.send(()).await;
        }
    }

    /// Poll until at least `count` chunks have begun playing.
    pub async fn wait_begun(&self, count: usize) -> Vec<AudioChunk> {
        let poll = async {
            loop {
                let begun = self.begun();
                if begun.len() >= count {
                    return begun;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(DEADLINE, poll)
            .await
            .unwrap_or_else(|_| panic!("fewer than {} chunks began playing", count))
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn open(&mut self, done_tx: mpsc::Sender<()>) -> Result<(), SessionError> {
        *self.done_tx.lock().unwrap() = Some(done_tx);
        Ok(())
    }

    async fn begin(&mut self, chunk: AudioChunk) -> Result<(), SessionError> {
        self.begun.lock().unwrap().push(chunk);
        Ok(())
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Transport handing out one pre-wired link; the test scripts both directions.
pub struct ScriptedTransport {
    link: Mutex<Option<TransportLink>>,
    opens: Arc<AtomicUsize>,
}

/// Test-side ends of a [`ScriptedTransport`] link.
pub struct TransportProbe {
    /// Feed inbound traffic to the session.
    pub inbound: mpsc::Sender<TransportEvent>,
    /// Messages the session pushed onto the wire.
    pub outbound: mpsc::Receiver<ClientMessage>,
    opens: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, TransportProbe) {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let opens = Arc::new(AtomicUsize::new(0));
        let probe = TransportProbe {
            inbound: inbound_tx,
            outbound: outbound_rx,
            opens: opens.clone(),
        };
        let transport = Self {
            link: Mutex::new(Some(TransportLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })),
            opens,
        };
        (transport, probe)
    }
}

impl TransportProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Next message the session pushed, `None` once the session dropped the wire.
    pub async fn recv_outbound(&mut self) -> Option<ClientMessage> {
        tokio::time::timeout(DEADLINE, self.outbound.recv())
            .await
            .expect("no outbound message within deadline")
    }

    /// Collect everything still on the wire. Only meaningful after the
    /// session ended and dropped its sender.
    pub async fn drain_outbound(&mut self) -> Vec<ClientMessage> {
        let mut seen = Vec::new();
        while let Some(message) = self.recv_outbound().await {
            seen.push(message);
        }
        seen
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn open(&self, _descriptor: &SessionDescriptor) -> Result<TransportLink, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.link.lock().unwrap().take().ok_or_else(|| {
            SessionError::TransportOpen("scripted transport already opened".to_string())
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Transport whose dial always fails.
pub struct FailingTransport;

#[async_trait]
impl AgentTransport for FailingTransport {
    async fn open(&self, _descriptor: &SessionDescriptor) -> Result<TransportLink, SessionError> {
        Err(SessionError::TransportOpen("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// A fully faked session plus every probe needed to script it.
pub struct Harness {
    pub session: ConversationSession,
    pub frames: mpsc::Sender<AudioFrame>,
    pub capture: CaptureProbe,
    pub sink: SinkProbe,
    pub transport: TransportProbe,
}

pub fn start_session(descriptor: SessionDescriptor) -> Harness {
    let (capture, frames, capture_probe) = ChannelCapture::new();
    let (sink, sink_probe) = RecordingSink::new();
    let (transport, transport_probe) = ScriptedTransport::new();
    let session = ConversationSession::start(
        descriptor,
        Box::new(capture),
        Box::new(sink),
        Box::new(transport),
    );
    Harness {
        session,
        frames,
        capture: capture_probe,
        sink: sink_probe,
        transport: transport_probe,
    }
}

/// Inbound control message from raw JSON.
pub fn control(json: &str) -> TransportEvent {
    TransportEvent::Text(json.to_string())
}

/// Inbound agent audio from PCM16 sample values.
pub fn agent_chunk(samples: &[i16]) -> TransportEvent {
    TransportEvent::Binary(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
}

/// Block until the session reports the target state.
pub async fn wait_for_state(states: &mut watch::Receiver<SessionState>, target: SessionState) {
    // A watch channel coalesces, so accept any state at or past the target.
    let wait = async {
        while *states.borrow() < target {
            states
                .changed()
                .await
                .expect("state channel closed before reaching target");
        }
    };
    tokio::time::timeout(DEADLINE, wait)
        .await
        .unwrap_or_else(|_| panic!("session never reached {}", target));
}

/// Receive the next broadcast event, failing loudly on a stalled session.
pub async fn recv_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(DEADLINE, events.recv())
        .await
        .expect("no event within deadline")
        .expect("event channel closed")
}

/// Drain the event stream until it closes, returning everything seen.
pub async fn drain_events(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(DEADLINE, events.recv()).await {
            Ok(Ok(event)) => seen.push(event),
            Ok(Err(broadcast::error::RecvError::Closed)) => return seen,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Err(_) => panic!("event stream never closed"),
        }
    }
}
