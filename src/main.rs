use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use arena_live::audio::{CaptureBackendFactory, CaptureConfig, CaptureSource, SpeakerSink};
use arena_live::{
    Config, ConversationSession, SessionDescriptor, SessionEvent, SessionSummary, WsTransport,
};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "arena-live", about = "Live duplex voice client for agent battles")]
struct Args {
    /// WebSocket endpoint of the agent under test
    #[arg(long)]
    endpoint: Option<String>,

    /// Second endpoint for a sequential head-to-head run
    #[arg(long)]
    endpoint_b: Option<String>,

    /// Participant label attached to logs and the summary
    #[arg(long, default_value = "agent-a")]
    participant: String,

    /// Scenario name, for display only
    #[arg(long)]
    scenario: Option<String>,

    /// Stream a WAV file instead of the microphone
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Maximum conversation duration in seconds
    #[arg(long)]
    max_duration: Option<u64>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = match args.config.as_deref() {
        Some(path) => Config::load(path).context("failed to load config")?,
        None => Config::default(),
    };

    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| cfg.arena.endpoint.clone());
    let mut runs = vec![(endpoint, args.participant.clone())];
    if let Some(endpoint_b) = args.endpoint_b.clone() {
        runs.push((endpoint_b, "agent-b".to_string()));
    }

    for (endpoint, participant) in runs {
        let summary = run_session(&args, &cfg, endpoint, participant).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

async fn run_session(
    args: &Args,
    cfg: &Config,
    endpoint: String,
    participant: String,
) -> Result<SessionSummary> {
    let capture_config = CaptureConfig {
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
        frame_duration_ms: cfg.audio.frame_duration_ms,
    };
    let source = match &args.wav {
        Some(path) => CaptureSource::WavFile(path.clone()),
        None => CaptureSource::Microphone,
    };
    let capture = CaptureBackendFactory::create(source, capture_config)?;
    let sink = Box::new(SpeakerSink::new(cfg.audio.sample_rate));

    let descriptor = SessionDescriptor {
        session_id: format!("session-{}", Uuid::new_v4()),
        endpoint,
        participant: participant.clone(),
        scenario: args.scenario.clone(),
        max_duration: Duration::from_secs(
            args.max_duration.unwrap_or(cfg.session.max_duration_secs),
        ),
        tick_interval: Duration::from_millis(cfg.session.tick_interval_ms),
    };

    let session = ConversationSession::start(descriptor, capture, sink, Box::new(WsTransport));
    let controller = session.controller();
    let mut events = session.subscribe();

    // Live event log
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Started { session_id }) => {
                    info!("Agent session acknowledged: {}", session_id)
                }
                Ok(SessionEvent::Turn(turn)) => info!("[{}] {}", turn.role, turn.text),
                Ok(SessionEvent::Interrupted) => info!("Barge-in, pending agent audio dropped"),
                Ok(SessionEvent::StateChanged { from, to }) => debug!("State: {} -> {}", from, to),
                Ok(SessionEvent::Error { message }) => warn!("Session error: {}", message),
                Ok(SessionEvent::Ended { reason }) => info!("Session ended: {}", reason),
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped)
                }
            }
        }
    });

    // Ctrl-C requests a graceful end; the agent still gets to wrap up.
    let interrupt_controller = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, ending conversation");
            interrupt_controller.end().await;
        }
    });

    let summary = session
        .wait()
        .await
        .with_context(|| format!("session against {} failed", participant))?;
    Ok(summary)
}
