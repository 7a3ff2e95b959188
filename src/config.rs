use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub arena: ArenaConfig,
    pub audio: AudioConfig,
    pub session: SessionTimingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArenaConfig {
    /// Default agent endpoint, overridable on the command line.
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionTimingConfig {
    pub max_duration_secs: u64,
    pub tick_interval_ms: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arena: ArenaConfig {
                endpoint: "ws://127.0.0.1:8000/api/v1/battles/local/agent-stream".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 16_000,
                channels: 1,
                frame_duration_ms: 20,
            },
            session: SessionTimingConfig {
                max_duration_secs: 120,
                tick_interval_ms: 100,
            },
        }
    }
}
