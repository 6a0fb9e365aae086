//! Peer messaging endpoint seam
//!
//! The tunnel manager only ever talks back to peers through this trait.
//! The hub client implements it for production; [`ChannelEndpoint`] is an
//! in-process implementation for embedding and tests.

use async_trait::async_trait;
use devproxy_proto::PeerId;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors returned by a peer endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Peer endpoint is closed")]
    Closed,

    #[error("Peer endpoint is not ready")]
    NotReady,
}

/// Outbound half of a peer messaging endpoint
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    /// Send a text message to a peer. Best effort: no delivery confirmation.
    async fn send_text(&self, peer: &PeerId, text: String) -> Result<(), EndpointError>;
}

/// Endpoint that forwards every outbound message into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    tx: mpsc::UnboundedSender<(PeerId, String)>,
}

impl ChannelEndpoint {
    /// Create an endpoint and the receiver observing what it sends
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(PeerId, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PeerEndpoint for ChannelEndpoint {
    async fn send_text(&self, peer: &PeerId, text: String) -> Result<(), EndpointError> {
        self.tx
            .send((peer.clone(), text))
            .map_err(|_| EndpointError::Closed)
    }
}
