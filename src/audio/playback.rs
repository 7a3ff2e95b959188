use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SessionError;

/// One decoded chunk of agent speech. Each inbound binary frame becomes one
/// chunk; it plays exactly once or is discarded by a barge-in.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
}

/// Destination for scheduled chunks.
///
/// `begin` starts exactly one chunk and returns immediately; the sink reports
/// completion by sending on the channel handed to `open`. The scheduler never
/// begins a second chunk before that notification arrives.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Open the output device. `done_tx` receives one message per finished chunk.
    async fn open(&mut self, done_tx: mpsc::Sender<()>) -> Result<(), SessionError>;

    /// Start playing one chunk.
    async fn begin(&mut self, chunk: AudioChunk) -> Result<(), SessionError>;

    /// Release the output device. Called once during teardown.
    async fn close(&mut self);

    /// Sink name for logging.
    fn name(&self) -> &str;
}

/// Strict FIFO queue of agent audio played back-to-back through one sink.
pub struct PlaybackScheduler {
    sink: Box<dyn OutputSink>,
    queue: VecDeque<AudioChunk>,
    playing: bool,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            queue: VecDeque::new(),
            playing: false,
        }
    }

    pub async fn open(&mut self, done_tx: mpsc::Sender<()>) -> Result<(), SessionError> {
        self.sink.open(done_tx).await?;
        debug!("output sink open: {}", self.sink.name());
        Ok(())
    }

    /// Queue a chunk, starting it immediately when nothing is sounding.
    pub async fn enqueue(&mut self, chunk: AudioChunk) {
        if self.playing {
            self.queue.push_back(chunk);
        } else {
            self.begin(chunk).await;
        }
    }

    /// Advance to the next queued chunk after the sink finished the current one.
    pub async fn on_playback_complete(&mut self) {
        self.playing = false;
        if let Some(next) = self.queue.pop_front() {
            self.begin(next).await;
        }
    }

    /// Barge-in: discard everything queued. The chunk already sounding is the
    /// sink's to finish; it is not cut off.
    pub fn interrupt(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }

    /// Whether a chunk is currently sounding.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Number of chunks waiting behind the one sounding.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub async fn close(&mut self) {
        self.queue.clear();
        self.sink.close().await;
    }

    async fn begin(&mut self, chunk: AudioChunk) {
        match self.sink.begin(chunk).await {
            Ok(()) => self.playing = true,
            Err(e) => {
                // The chunk is lost; the next enqueue tries the sink again.
                self.playing = false;
                warn!("failed to start playback on {}: {}", self.sink.name(), e);
            }
        }
    }
}
