//! Live API WebSocket session
//!
//! Speaks the bidirectional streaming protocol: a `setup` message, then
//! `realtimeInput` audio chunks upstream and `serverContent` messages
//! downstream. Reconnection is left to the caller.

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use std::sync::Arc;

use super::{Connector, Transport, TransportEvent};
use crate::audio::EncodedBlob;
use crate::config::SessionConfig;
use crate::{Error, Result};

/// Frames buffered between `send` callers and the socket writer
const OUTBOUND_QUEUE: usize = 256;

/// Connected Live API session
pub struct LiveSession {
    outbound: mpsc::Sender<Message>,
    reader: JoinHandle<()>,
}

impl LiveSession {
    /// Connect, send the setup message, and start forwarding server events
    ///
    /// # Errors
    ///
    /// Returns error if the config lacks an API key or the connection fails
    pub async fn connect(
        config: &SessionConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        let url = session_url(config)?;
        tracing::info!(model = %config.model, voice = %config.voice, "connecting live session");

        let (socket, _response) = connect_async(url.as_str()).await?;
        let (mut sink, stream) = socket.split();

        sink.send(Message::Text(setup_message(config).to_string()))
            .await?;

        if events.send(TransportEvent::Opened).await.is_err() {
            return Err(Error::Transport("event consumer is gone".to_string()));
        }

        let (outbound, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
        let writer_events = events.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(error = %e, "live session write failed");
                    let _ = writer_events
                        .send(TransportEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader = tokio::spawn(read_loop(stream, events));

        Ok(Self {
            outbound,
            reader,
        })
    }
}

#[async_trait]
impl Transport for LiveSession {
    async fn send(&self, blob: EncodedBlob) -> Result<()> {
        let message = realtime_input_message(&blob).to_string();
        self.outbound
            .send(Message::Text(message))
            .await
            .map_err(|_| Error::Transport("live session closed".to_string()))
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!("closing live session");
        self.outbound
            .send(Message::Close(None))
            .await
            .map_err(|_| Error::Transport("live session already closed".to_string()))
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        // The writer drains queued frames (a pending close included) and
        // exits once `outbound` is gone
        self.reader.abort();
    }
}

/// Opens [`LiveSession`]s from a fixed session config
#[derive(Debug, Clone)]
pub struct LiveConnector {
    config: SessionConfig,
}

impl LiveConnector {
    #[must_use]
    pub const fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for LiveConnector {
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<Arc<dyn Transport>> {
        let session: Arc<dyn Transport> = Arc::new(LiveSession::connect(&self.config, events).await?);
        Ok(session)
    }
}

/// Build the connection URL with the API key attached
///
/// # Errors
///
/// Returns `Config` if the endpoint is invalid or no key is configured
pub fn session_url(config: &SessionConfig) -> Result<Url> {
    let key = config
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::Config("no API key configured (set GEMINI_API_KEY)".to_string()))?;

    let mut url = Url::parse(&config.endpoint)
        .map_err(|e| Error::Config(format!("invalid endpoint {}: {e}", config.endpoint)))?;
    url.query_pairs_mut().append_pair("key", key);
    Ok(url)
}

/// First message on a new session
#[must_use]
pub fn setup_message(config: &SessionConfig) -> serde_json::Value {
    let model = if config.model.starts_with("models/") {
        config.model.clone()
    } else {
        format!("models/{}", config.model)
    };

    json!({
        "setup": {
            "model": model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": config.voice }
                    }
                }
            }
        }
    })
}

/// Upstream envelope for one captured chunk
#[must_use]
pub fn realtime_input_message(blob: &EncodedBlob) -> serde_json::Value {
    json!({ "realtimeInput": { "mediaChunks": [blob] } })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    server_content: Option<ServerContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<EncodedBlob>,
}

/// Translate one server message into events, in the order they apply
///
/// Audio parts come first, then the interruption flag, then turn completion.
///
/// # Errors
///
/// Returns error if the message is not valid JSON of the expected shape
pub fn parse_server_message(text: &str) -> Result<Vec<TransportEvent>> {
    let message: ServerMessage = serde_json::from_str(text)?;
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        tracing::debug!("live session setup complete");
    }

    if let Some(content) = message.server_content {
        if let Some(turn) = content.model_turn {
            events.extend(
                turn.parts
                    .into_iter()
                    .filter_map(|part| part.inline_data)
                    .map(TransportEvent::Audio),
            );
        }
        if content.interrupted {
            events.push(TransportEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(TransportEvent::TurnComplete);
        }
    }

    Ok(events)
}

/// Forward server frames as events until the socket closes
async fn read_loop<S>(mut stream: S, events: mpsc::Sender<TransportEvent>)
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    let mut reason = String::new();

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!("ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                reason = frame.map(|f| f.reason.into_owned()).unwrap_or_default();
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "live session read failed");
                reason = e.to_string();
                let _ = events
                    .send(TransportEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                break;
            }
        };

        match parse_server_message(&text) {
            Ok(parsed) => {
                for event in parsed {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring unparsable server message"),
        }
    }

    tracing::info!(reason = %reason, "live session closed");
    let _ = events.send(TransportEvent::Closed { reason }).await;
}
