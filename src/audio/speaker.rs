use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::audio::playback::{AudioChunk, OutputSink};
use crate::error::SessionError;

/// Output sink for the default output device.
///
/// Like capture, the cpal stream lives on its own thread. The playback
/// callback drains one chunk at a time from shared state, upsampling by
/// sample repetition when the device cannot run at the wire rate, and fanning
/// the mono signal out to every device channel. Silence plays when no chunk
/// is loaded.
pub struct SpeakerSink {
    source_rate: u32,
    shared: Arc<Mutex<PlaybackState>>,
    worker: Option<PlaybackWorker>,
}

struct PlaybackWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

#[derive(Default)]
struct PlaybackState {
    current: Option<PlayingChunk>,
}

struct PlayingChunk {
    samples: Vec<f32>,
    frames_emitted: usize,
}

impl SpeakerSink {
    pub fn new(source_rate: u32) -> Self {
        Self {
            source_rate,
            shared: Arc::new(Mutex::new(PlaybackState::default())),
            worker: None,
        }
    }
}

#[async_trait]
impl OutputSink for SpeakerSink {
    async fn open(&mut self, done_tx: mpsc::Sender<()>) -> Result<(), SessionError> {
        if self.worker.is_some() {
            return Err(SessionError::DeviceUnavailable(
                "output sink is already open".to_string(),
            ));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let shared = self.shared.clone();
        let source_rate = self.source_rate;

        let thread =
            thread::spawn(move || playback_thread(source_rate, shared, done_tx, ready_tx, stop_rx));

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(PlaybackWorker { stop_tx, thread });
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SessionError::DeviceUnavailable(
                "playback thread exited before reporting readiness".to_string(),
            )),
        }
    }

    async fn begin(&mut self, chunk: AudioChunk) -> Result<(), SessionError> {
        if self.worker.is_none() {
            return Err(SessionError::DeviceUnavailable(
                "output sink is not open".to_string(),
            ));
        }
        let mut state = self.shared.lock().unwrap();
        if state.current.is_some() {
            warn!("begin called while a chunk is still sounding; replacing it");
        }
        state.current = Some(PlayingChunk {
            samples: chunk.samples,
            frames_emitted: 0,
        });
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            match tokio::task::spawn_blocking(move || worker.thread.join()).await {
                Ok(Ok(())) => debug!("playback thread stopped"),
                Ok(Err(_)) => warn!("playback thread panicked during close"),
                Err(e) => warn!("failed to join playback thread: {}", e),
            }
        }
        self.shared.lock().unwrap().current = None;
    }

    fn name(&self) -> &str {
        "speaker"
    }
}

fn playback_thread(
    source_rate: u32,
    shared: Arc<Mutex<PlaybackState>>,
    done_tx: mpsc::Sender<()>,
    ready_tx: oneshot::Sender<Result<(), SessionError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match build_playback_stream(source_rate, shared, done_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(SessionError::DeviceUnavailable(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    let _ = stop_rx.recv();
    drop(stream);
}

fn build_playback_stream(
    source_rate: u32,
    shared: Arc<Mutex<PlaybackState>>,
    done_tx: mpsc::Sender<()>,
) -> Result<cpal::Stream, SessionError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        SessionError::DeviceUnavailable("no output device available".to_string())
    })?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let ranges = device
        .supported_output_configs()
        .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;
    let (stream_config, repeat) = select_output_config(ranges, source_rate).ok_or_else(|| {
        SessionError::DeviceUnavailable(format!(
            "{} supports no f32 config at {} Hz or an integer multiple of it",
            device_name, source_rate
        ))
    })?;

    info!(
        "Playback device: {} ({} ch @ {} Hz, repeat {})",
        device_name, stream_config.channels, stream_config.sample_rate.0, repeat
    );

    let channels = stream_config.channels as usize;
    let stream = device
        .build_output_stream(
            &stream_config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut state = shared.lock().unwrap();
                for frame in out.chunks_mut(channels) {
                    let mut sample = 0.0f32;
                    let mut finished = false;
                    if let Some(chunk) = state.current.as_mut() {
                        let index = chunk.frames_emitted / repeat;
                        if index < chunk.samples.len() {
                            sample = chunk.samples[index];
                            chunk.frames_emitted += 1;
                        } else {
                            finished = true;
                        }
                    }
                    if finished {
                        state.current = None;
                        if done_tx.try_send(()).is_err() {
                            debug!("playback completion notification dropped");
                        }
                    }
                    for slot in frame.iter_mut() {
                        *slot = sample;
                    }
                }
            },
            |err| error!("playback stream error: {}", err),
            None,
        )
        .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

    Ok(stream)
}

/// Pick an f32 mono or stereo config at the source rate, or at the smallest
/// integer multiple of it we can upsample to by repetition.
fn select_output_config(
    ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    source_rate: u32,
) -> Option<(StreamConfig, usize)> {
    let candidates: Vec<_> = ranges
        .filter(|r| r.sample_format() == SampleFormat::F32)
        .filter(|r| r.channels() == 1 || r.channels() == 2)
        .collect();

    for factor in 1..=8usize {
        let rate = source_rate * factor as u32;
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
