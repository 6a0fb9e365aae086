//! Devproxy Protocol Definitions
//!
//! This crate defines the peer identity type and the hub wire messages
//! shared by the tunnel manager, the hub client and the CLI.

pub mod codec;
pub mod messages;
pub mod peer;

pub use codec::{CodecError, HubCodec};
pub use messages::HubMessage;
pub use peer::PeerId;

/// Protocol version announced in the hub login
pub const PROTOCOL_VERSION: u32 = 1;

/// Notice sent to a peer when its TCP connection goes away
pub const CONNECTION_LOST_NOTICE: &str = "#Connection lost.";
