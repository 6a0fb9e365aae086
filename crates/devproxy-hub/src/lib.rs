//! Messaging hub client
//!
//! Connects this device to a messaging hub over WebSocket, feeds paired and
//! text events into the tunnel manager, and implements [`PeerEndpoint`] so
//! the manager can answer peers.
//!
//! [`PeerEndpoint`]: devproxy_tunnel::PeerEndpoint

pub mod client;
pub mod config;

pub use client::{HubClient, HubSession, RotateKeysCallback};
pub use config::HubConfig;

use thiserror::Error;

/// Hub client errors
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Invalid hub URL {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Hub connection closed")]
    Closed,

    #[error("Key rotation failed: {0}")]
    KeyRotation(String),

    #[error("Tunnel manager has stopped")]
    ManagerStopped,
}
