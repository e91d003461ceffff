//! Reference transport: JSON messages over a WebSocket.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};

use super::events::{InboundEvent, TransportEvent};
use super::transport::{ChannelSink, Connection, FrameSink, Transport};
use crate::audio::codec;
use crate::audio::types::{pcm_mime_type, EncodedFrame};
use crate::config::SessionConfig;
use crate::error::{Result, VoxError};

type SessionWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

/// Opens [`WebSocketConnection`]s.
///
/// Sends a `session.start` bootstrap message on connect, then one
/// `input_audio` message per frame. Never reconnects on its own.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn Connection>> {
        let url = config.url.trim();
        if url.is_empty() {
            return Err(VoxError::Configuration("session URL cannot be empty".into()));
        }
        let bootstrap_payload = build_session_bootstrap_payload(config)?;

        let mut socket = connect_session_socket(url, config.api_key.as_deref()).await?;
        send_bootstrap_message(&mut socket, &bootstrap_payload).await?;
        tracing::debug!(url, model = %config.model, "websocket session opened");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _ = events_tx.send(TransportEvent::Opened);
        let task = tokio::spawn(run_connection(
            socket,
            events_tx,
            frames_rx,
            shutdown_rx,
            config.heartbeat_interval.max(MIN_HEARTBEAT),
        ));

        Ok(Box::new(WebSocketConnection {
            sink: Arc::new(ChannelSink::new(frames_tx)),
            events_rx,
            runtime: Some(ConnectionRuntime { shutdown_tx, task }),
        }))
    }
}

struct ConnectionRuntime {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// A live WebSocket session. Frames go out through [`Connection::sink`];
/// server messages arrive through [`Connection::next_event`].
pub struct WebSocketConnection {
    sink: Arc<ChannelSink>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    runtime: Option<ConnectionRuntime>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn sink(&self) -> Arc<dyn FrameSink> {
        self.sink.clone()
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(runtime) = self.runtime.take() {
            let _ = runtime.shutdown_tx.send(true);
            runtime.task.await.map_err(|error| {
                VoxError::Transport(format!("websocket runtime task failed: {error}"))
            })?;
        }
        Ok(())
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = runtime.shutdown_tx.send(true);
            runtime.task.abort();
        }
    }
}

async fn run_connection(
    mut socket: SessionWebSocket,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    mut frames_rx: mpsc::UnboundedReceiver<EncodedFrame>,
    mut shutdown_rx: watch::Receiver<bool>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut outbound_open = true;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            frame = frames_rx.recv(), if outbound_open => {
                let Some(frame) = frame else {
                    outbound_open = false;
                    continue;
                };
                if let Err(error) = socket.send(Message::Text(input_audio_message(&frame))).await {
                    let _ = events_tx.send(TransportEvent::Error {
                        message: format!("websocket send failed: {error}"),
                    });
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(error) = socket.send(Message::Ping(Vec::new())).await {
                    let _ = events_tx.send(TransportEvent::Error {
                        message: format!("websocket heartbeat failed: {error}"),
                    });
                    break;
                }
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(message)) => {
                        match handle_server_message(&mut socket, &events_tx, message).await {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(error) => {
                                let _ = events_tx.send(TransportEvent::Error {
                                    message: format!("websocket frame handling failed: {error}"),
                                });
                                break;
                            }
                        }
                    }
                    Some(Err(error)) => {
                        let _ = events_tx.send(TransportEvent::Error {
                            message: format!("websocket receive failed: {error}"),
                        });
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let _ = events_tx.send(TransportEvent::Closed);
}

/// Returns `Ok(false)` when the server closed the session.
async fn handle_server_message(
    socket: &mut SessionWebSocket,
    events_tx: &mpsc::UnboundedSender<TransportEvent>,
    message: Message,
) -> std::result::Result<bool, WsError> {
    match message {
        Message::Text(text) => forward_event(&text, events_tx),
        Message::Binary(bytes) => {
            if let Ok(text) = String::from_utf8(bytes) {
                forward_event(&text, events_tx);
            }
        }
        Message::Ping(payload) => socket.send(Message::Pong(payload)).await?,
        Message::Pong(_) => {}
        Message::Close(_) => return Ok(false),
        Message::Frame(_) => {}
    }
    Ok(true)
}

fn forward_event(payload: &str, events_tx: &mpsc::UnboundedSender<TransportEvent>) {
    let _ = events_tx.send(TransportEvent::Message(InboundEvent::from_text(payload)));
}

fn input_audio_message(frame: &EncodedFrame) -> String {
    json!({
        "type": "input_audio",
        "mimeType": frame.mime_type(),
        "data": codec::encode_base64(frame),
    })
    .to_string()
}

fn build_session_bootstrap_payload(config: &SessionConfig) -> Result<String> {
    let mut session = Map::new();
    session.insert("model".into(), Value::String(config.model.clone()));
    session.insert(
        "input_audio_format".into(),
        Value::String(pcm_mime_type(config.input_sample_rate, 1)),
    );
    session.insert(
        "output_audio_format".into(),
        Value::String(pcm_mime_type(
            config.output_sample_rate,
            config.output_channels,
        )),
    );
    if let Some(voice) = &config.voice {
        session.insert("voice".into(), Value::String(voice.clone()));
    }
    if let Some(instructions) = &config.instructions {
        session.insert("instructions".into(), Value::String(instructions.clone()));
    }

    serde_json::to_string(&json!({
        "type": "session.start",
        "session": Value::Object(session),
    }))
    .map_err(VoxError::from)
}

async fn connect_session_socket(url: &str, api_key: Option<&str>) -> Result<SessionWebSocket> {
    let mut request = url.into_client_request().map_err(|error| {
        VoxError::Configuration(format!("invalid session websocket URL: {error}"))
    })?;
    if let Some(api_key) = api_key.filter(|key| !key.trim().is_empty()) {
        let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|error| {
            VoxError::Configuration(format!("invalid session auth header: {error}"))
        })?;
        request.headers_mut().insert("Authorization", auth_value);
    }

    connect_async(request)
        .await
        .map(|(socket, _)| socket)
        .map_err(map_connect_error)
}

async fn send_bootstrap_message(socket: &mut SessionWebSocket, payload: &str) -> Result<()> {
    socket
        .send(Message::Text(payload.to_string()))
        .await
        .map_err(|error| VoxError::Transport(format!("session bootstrap send failed: {error}")))
}

fn map_connect_error(error: WsError) -> VoxError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            VoxError::Transport(format!(
                "websocket handshake rejected with status {status}"
            ))
        }
        WsError::Url(error) => {
            VoxError::Configuration(format!("invalid session websocket URL: {error}"))
        }
        other => VoxError::Transport(format!("websocket connect failed: {other}")),
    }
}
