use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::file::WavFileBackend;
use crate::audio::microphone::MicrophoneBackend;
use crate::error::SessionError;

/// One fixed-size buffer of captured samples. Frames are encoded and sent the
/// moment they arrive and never retained afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
}

/// Capture format shared by every backend.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Wire sample rate in Hz.
    pub sample_rate: u32,
    /// Wire channel count. The protocol is mono; backends downmix.
    pub channels: u16,
    /// Length of each emitted frame in milliseconds.
    pub frame_duration_ms: u64,
}

impl CaptureConfig {
    /// Number of samples in one emitted frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms / 1000) as usize
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_duration_ms: 20,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - `microphone`: cpal input device, downmixed and decimated to the wire format
/// - `wav-file`: frames paced in real time from a WAV file (headless runs, tests)
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Request the input device and start the frame stream. The channel
    /// closes when the source is exhausted or released.
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, SessionError>;

    /// Release the input device. Called once during teardown.
    async fn release(&mut self) -> Result<(), SessionError>;

    /// Whether the backend currently holds its source.
    fn is_capturing(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Where captured audio comes from.
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Default input device of the host.
    Microphone,
    /// 16-bit PCM WAV file matching the capture config.
    WavFile(PathBuf),
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    /// Create a capture backend for the given source.
    pub fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, SessionError> {
        match source {
            CaptureSource::Microphone => Ok(Box::new(MicrophoneBackend::new(config))),
            CaptureSource::WavFile(path) => Ok(Box::new(WavFileBackend::new(path, config))),
        }
    }
}
