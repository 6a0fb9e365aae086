//! WebSocket hub client
//!
//! [`HubClient::connect`] returns two halves:
//! - [`HubClient`]: cheap to clone, sends frames to the hub, implements
//!   [`PeerEndpoint`] for the tunnel manager.
//! - [`HubSession`]: owns the read side; [`HubSession::run`] turns hub frames
//!   into tunnel events until the connection ends.

use crate::config::HubConfig;
use crate::HubError;
use async_trait::async_trait;
use devproxy_proto::{HubCodec, HubMessage, PeerId, PROTOCOL_VERSION};
use devproxy_tunnel::{EndpointError, PeerEndpoint, TunnelHandle};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Invoked when the hub asks for a temporary key rotation. Runs on a blocking
/// thread, so it may do file I/O.
pub type RotateKeysCallback = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// Sending half of a hub connection
#[derive(Debug, Clone)]
pub struct HubClient {
    outbound: mpsc::UnboundedSender<HubMessage>,
    ready: Arc<AtomicBool>,
}

impl HubClient {
    /// Open the WebSocket, start the writer task and send the login frame
    pub async fn connect(config: &HubConfig) -> Result<(HubClient, HubSession), HubError> {
        let url = config.parsed_url()?;
        info!(hub = %url, "Connecting to hub");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (sink, source) = ws_stream.split();

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(writer_task(sink, outbound_rx));

        let client = HubClient {
            outbound,
            ready: Arc::new(AtomicBool::new(false)),
        };

        client.send(HubMessage::Login {
            protocol_version: PROTOCOL_VERSION,
            device_address: config.device_address.clone(),
            device_name: config.device_name.clone(),
            pairing_secret: config.pairing_secret.clone(),
        })?;

        let session = HubSession {
            source,
            ready: client.ready.clone(),
            writer,
            on_rotate: None,
        };

        Ok((client, session))
    }

    /// Whether the hub has accepted our login
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Queue a frame for the hub
    pub fn send(&self, msg: HubMessage) -> Result<(), HubError> {
        self.outbound.send(msg).map_err(|_| HubError::Closed)
    }
}

#[async_trait]
impl PeerEndpoint for HubClient {
    async fn send_text(&self, peer: &PeerId, text: String) -> Result<(), EndpointError> {
        if !self.is_ready() {
            return Err(EndpointError::NotReady);
        }
        self.outbound
            .send(HubMessage::SendText {
                to: peer.clone(),
                text,
            })
            .map_err(|_| EndpointError::Closed)
    }
}

/// Writer task - encodes queued messages into WebSocket text frames
async fn writer_task(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<HubMessage>,
) {
    while let Some(msg) = rx.recv().await {
        let frame = match HubCodec::encode(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping message that cannot be encoded");
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(frame)).await {
            error!("Hub send error: {}", e);
            break;
        }
    }

    let _ = sink.close().await;
    debug!("Hub writer task ended");
}

/// Receiving half of a hub connection
pub struct HubSession {
    source: SplitStream<WsStream>,
    ready: Arc<AtomicBool>,
    writer: JoinHandle<()>,
    on_rotate: Option<RotateKeysCallback>,
}

impl HubSession {
    /// Register the handler for `rotate_keys` requests
    pub fn on_rotate_keys(mut self, callback: RotateKeysCallback) -> Self {
        self.on_rotate = Some(callback);
        self
    }

    /// Forward hub events to the tunnel manager until the connection ends
    ///
    /// Always returns an error: the session only ends when the hub goes away,
    /// the manager stops, or key rotation fails.
    pub async fn run(mut self, tunnels: TunnelHandle) -> Result<(), HubError> {
        let result = self.read_loop(&tunnels).await;

        self.ready.store(false, Ordering::SeqCst);
        self.writer.abort();

        if let Err(ref e) = result {
            warn!(error = %e, "Hub session ended");
        }
        result
    }

    async fn read_loop(&mut self, tunnels: &TunnelHandle) -> Result<(), HubError> {
        while let Some(message) = self.source.next().await {
            match message? {
                Message::Text(frame) => self.dispatch(&frame, tunnels).await?,
                Message::Close(frame) => {
                    info!(?frame, "Hub closed the connection");
                    return Err(HubError::Closed);
                }
                Message::Binary(data) => {
                    warn!(bytes = data.len(), "Ignoring binary frame from hub");
                }
                // Ping/pong are answered by tungstenite
                _ => {}
            }
        }

        Err(HubError::Closed)
    }

    async fn dispatch(&self, frame: &str, tunnels: &TunnelHandle) -> Result<(), HubError> {
        let msg = match HubCodec::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed hub frame");
                return Ok(());
            }
        };

        match msg {
            HubMessage::Ready => {
                if !self.ready.swap(true, Ordering::SeqCst) {
                    info!("Hub accepted login, device is reachable");
                }
            }
            HubMessage::Paired { from } => {
                tunnels
                    .paired(from)
                    .map_err(|_| HubError::ManagerStopped)?;
            }
            HubMessage::Text { from, text } => {
                tunnels
                    .text_received(from, text)
                    .map_err(|_| HubError::ManagerStopped)?;
            }
            HubMessage::RotateKeys => match &self.on_rotate {
                Some(rotate) => {
                    // The callback writes the key file
                    let rotate = rotate.clone();
                    tokio::task::spawn_blocking(move || rotate())
                        .await
                        .map_err(|e| HubError::KeyRotation(e.to_string()))?
                        .map_err(HubError::KeyRotation)?;
                    info!("Rotated temporary keys");
                }
                None => warn!("Hub requested key rotation but no handler is registered"),
            },
            HubMessage::Error { message } => {
                warn!(message = %message, "Hub reported an error");
            }
            // Rejected by the codec
            HubMessage::Login { .. } | HubMessage::SendText { .. } => {}
        }

        Ok(())
    }
}
