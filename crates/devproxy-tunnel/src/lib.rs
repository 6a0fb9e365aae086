//! Tunnel manager - bridges peer text messages to per-peer TCP connections
//!
//! Text from a peer is written, newline terminated, to a TCP connection owned
//! by that peer; bytes coming back from the connection are sent to the peer
//! as text. Connections open lazily, queue input until connected, and reset
//! on close so the next message reconnects.

pub mod config;
mod connection;
pub mod endpoint;
pub mod event;
pub mod manager;
pub mod tunnel;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, Greeting, TunnelConfig, TunnelConfigBuilder, PEER_PLACEHOLDER};
pub use endpoint::{ChannelEndpoint, EndpointError, PeerEndpoint};
pub use event::{CloseReason, ConnectionId, TunnelEvent};
pub use manager::{TunnelError, TunnelHandle, TunnelManager};
pub use tunnel::{Tunnel, TunnelState};

pub use devproxy_proto::PeerId;
