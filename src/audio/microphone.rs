use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::audio::capture::{AudioFrame, CaptureBackend, CaptureConfig};
use crate::error::SessionError;

/// Capture backend for the default input device.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated OS thread
/// for the lifetime of the capture. The thread downmixes to mono, decimates
/// to the wire rate when the device cannot run at it natively, and pushes
/// fixed-size frames into a channel.
pub struct MicrophoneBackend {
    config: CaptureConfig,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl MicrophoneBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config, worker: None }
    }
}

#[async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, SessionError> {
        if self.worker.is_some() {
            return Err(SessionError::DeviceUnavailable(
                "microphone capture is already active".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let config = self.config.clone();

        let thread = thread::spawn(move || capture_thread(config, frame_tx, ready_tx, stop_rx));

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { stop_tx, thread });
                Ok(frame_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SessionError::DeviceUnavailable(
                "capture thread exited before reporting readiness".to_string(),
            )),
        }
    }

    async fn release(&mut self) -> Result<(), SessionError> {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            match tokio::task::spawn_blocking(move || worker.thread.join()).await {
                Ok(Ok(())) => debug!("microphone capture thread stopped"),
                Ok(Err(_)) => warn!("microphone capture thread panicked during release"),
                Err(e) => warn!("failed to join microphone capture thread: {}", e),
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Owns the cpal stream until a stop message arrives or the backend is dropped.
fn capture_thread(
    config: CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<(), SessionError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match build_capture_stream(&config, frame_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(map_host_error(&e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Block until release. Dropping the stream stops capture.
    let _ = stop_rx.recv();
    drop(stream);
}

fn build_capture_stream(
    config: &CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, SessionError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or_else(|| {
        SessionError::DeviceUnavailable("no input device available".to_string())
    })?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let ranges = device
        .supported_input_configs()
        .map_err(|e| map_host_error(&e.to_string()))?;
    let (stream_config, decimation) = select_input_config(ranges, config.sample_rate)
        .ok_or_else(|| {
            SessionError::DeviceUnavailable(format!(
                "{} supports no f32 config at {} Hz or an integer multiple of it",
                device_name, config.sample_rate
            ))
        })?;

    info!(
        "Capture device: {} ({} ch @ {} Hz, decimation {})",
        device_name, stream_config.channels, stream_config.sample_rate.0, decimation
    );

    let channels = stream_config.channels as usize;
    let frame_len = config.samples_per_frame();
    let mut pending: Vec<f32> = Vec::with_capacity(frame_len);
    let mut phase = 0usize;

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for group in data.chunks(channels) {
                    let sample = if channels == 2 {
                        (group[0] + group[1]) / 2.0
                    } else {
                        group[0]
                    };
                    if phase == 0 {
                        pending.push(sample);
                        if pending.len() == frame_len {
                            let samples =
                                std::mem::replace(&mut pending, Vec::with_capacity(frame_len));
                            if frame_tx.try_send(AudioFrame { samples }).is_err() {
                                debug!("capture frame dropped: channel full");
                            }
                        }
                    }
                    phase = (phase + 1) % decimation;
                }
            },
            |err| error!("capture stream error: {}", err),
            None,
        )
        .map_err(|e| map_host_error(&e.to_string()))?;

    Ok(stream)
}

/// Pick an f32 mono or stereo config at the target rate, or at the smallest
/// integer multiple of it we can decimate down from.
fn select_input_config(
    ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<(StreamConfig, usize)> {
    let candidates: Vec<_> = ranges
        .filter(|r| r.sample_format() == SampleFormat::F32)
        .filter(|r| r.channels() == 1 || r.channels() == 2)
        .collect();

    for factor in 1..=8usize {
        let rate = target_rate * factor as u32;
        for range in &candidates {
            if range.min_sample_rate().0 <= rate && range.max_sample_rate().0 >= rate {
                let config = StreamConfig {
                    channels: range.channels(),
                    sample_rate: SampleRate(rate),
                    buffer_size: cpal::BufferSize::Default,
                };
                return Some((config, factor));
            }
        }
    }
    None
}

/// Host error strings are all we get from cpal; permission problems are
/// recognizable by wording on every supported platform.
fn map_host_error(detail: &str) -> SessionError {
    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not authorized")
    {
        SessionError::PermissionDenied(detail.to_string())
    } else {
        SessionError::DeviceUnavailable(detail.to_string())
    }
}
