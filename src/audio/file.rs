use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audio::capture::{AudioFrame, CaptureBackend, CaptureConfig};
use crate::error::SessionError;

/// Capture backend that streams a WAV file as if it were a microphone.
///
/// Frames are paced at real-time cadence so the agent side hears speech at
/// normal speed. The stream ends when the file is exhausted; the session
/// keeps running on silence after that.
pub struct WavFileBackend {
    path: PathBuf,
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: PathBuf, config: CaptureConfig) -> Self {
        Self {
            path,
            config,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    fn load_samples(&self) -> Result<Vec<f32>, SessionError> {
        let reader = hound::WavReader::open(&self.path).map_err(|e| {
            SessionError::DeviceUnavailable(format!("failed to open {}: {}", self.path.display(), e))
        })?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(SessionError::DeviceUnavailable(format!(
                "{}: only 16-bit PCM WAV is supported",
                self.path.display()
            )));
        }
        if spec.sample_rate != self.config.sample_rate || spec.channels != self.config.channels {
            return Err(SessionError::DeviceUnavailable(format!(
                "{}: expected {} Hz / {} ch, got {} Hz / {} ch",
                self.path.display(),
                self.config.sample_rate,
                self.config.channels,
                spec.sample_rate,
                spec.channels
            )));
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                SessionError::DeviceUnavailable(format!(
                    "failed to read samples from {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        Ok(samples.into_iter().map(|s| s as f32 / 32768.0).collect())
    }
}

#[async_trait]
impl CaptureBackend for WavFileBackend {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, SessionError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SessionError::DeviceUnavailable(format!(
                "{} is already being captured",
                self.path.display()
            )));
        }

        let samples = self.load_samples()?;
        let duration_secs = samples.len() as f64 / self.config.sample_rate as f64;
        info!(
            "WAV capture source: {} ({:.1}s of audio)",
            self.path.display(),
            duration_secs
        );

        let (frame_tx, frame_rx) = mpsc::channel(100);
        let frame_len = self.config.samples_per_frame();
        let period = Duration::from_millis(self.config.frame_duration_ms);
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut offset = 0;
            while running.load(Ordering::SeqCst) && offset < samples.len() {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let end = (offset + frame_len).min(samples.len());
                let mut frame = samples[offset..end].to_vec();
                // The final frame is padded with silence to keep sizes fixed.
                frame.resize(frame_len, 0.0);
                offset = end;
                if frame_tx.send(AudioFrame { samples: frame }).await.is_err() {
                    break;
                }
            }
            running.store(false, Ordering::SeqCst);
            debug!("WAV capture finished after {} samples", offset);
        });
        self.task = Some(task);

        Ok(frame_rx)
    }

    async fn release(&mut self) -> Result<(), SessionError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
