//! Duplex transport to the agent endpoint.
//!
//! A transport hands back one [`TransportLink`]: a bounded sender for
//! outbound traffic and a receiver for everything inbound. Inbound text is
//! delivered raw; control parsing happens in the session driver so malformed
//! payloads can be counted there. Dropping the outbound sender closes the
//! connection.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::protocol::ClientCommand;
use crate::session::SessionDescriptor;

/// Messages the client pushes onto the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Encoded PCM16 frame, sent as one binary message.
    Audio(Vec<u8>),
    /// JSON control message.
    Control(ClientCommand),
}

/// Inbound traffic, before any control parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Binary payload (agent audio).
    Binary(Vec<u8>),
    /// Text payload (control event).
    Text(String),
    /// The connection closed. Terminal.
    Closed,
    /// The connection failed. Terminal.
    Error(String),
}

/// Both directions of one open connection.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Agent transport trait
///
/// One connection per session and participant; reconnection is the caller's
/// business, never the transport's.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Dial the endpoint named by the descriptor.
    async fn open(&self, descriptor: &SessionDescriptor) -> Result<TransportLink, SessionError>;

    /// Transport name for logging.
    fn name(&self) -> &str;
}

/// WebSocket transport used in production.
pub struct WsTransport;

#[async_trait]
impl AgentTransport for WsTransport {
    async fn open(&self, descriptor: &SessionDescriptor) -> Result<TransportLink, SessionError> {
        let (stream, _response) = connect_async(descriptor.endpoint.as_str())
            .await
            .map_err(|e| SessionError::TransportOpen(e.to_string()))?;
        info!(
            "WebSocket open: {} ({})",
            descriptor.endpoint, descriptor.participant
        );

        let (mut ws_tx, mut ws_rx) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(64);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(100);

        // Writer pump: drains the outbound channel, then closes the socket
        // once every sender is gone.
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let frame = match message {
                    ClientMessage::Audio(bytes) => Message::Binary(bytes),
                    ClientMessage::Control(command) => match serde_json::to_string(&command) {
                        Ok(json) => Message::Text(json),
                        Err(e) => {
                            warn!("failed to encode control message: {}", e);
                            continue;
                        }
                    },
                };
                if let Err(e) = ws_tx.send(frame).await {
                    debug!("WebSocket send failed: {}", e);
                    break;
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
            let _ = ws_tx.close().await;
        });

        // Reader pump: maps socket traffic onto transport events until the
        // connection ends or the session stops listening.
        tokio::spawn(async move {
            loop {
                let event = match ws_rx.next().await {
                    Some(Ok(Message::Binary(bytes))) => TransportEvent::Binary(bytes),
                    Some(Ok(Message::Text(text))) => TransportEvent::Text(text),
                    Some(Ok(Message::Close(_))) | None => TransportEvent::Closed,
                    Some(Ok(_)) => continue, // ping/pong
                    Some(Err(e)) => TransportEvent::Error(e.to_string()),
                };
                let terminal = matches!(event, TransportEvent::Closed | TransportEvent::Error(_));
                if inbound_tx.send(event).await.is_err() || terminal {
                    break;
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    fn name(&self) -> &str {
        "websocket"
    }
}
