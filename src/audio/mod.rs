pub mod capture;
pub mod file;
pub mod microphone;
pub mod pcm;
pub mod playback;
pub mod speaker;

pub use capture::{AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureSource};
pub use file::WavFileBackend;
pub use microphone::MicrophoneBackend;
pub use playback::{AudioChunk, OutputSink, PlaybackScheduler};
pub use speaker::SpeakerSink;
