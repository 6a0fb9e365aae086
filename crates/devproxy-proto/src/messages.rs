//! Hub message types

use crate::peer::PeerId;
use serde::{Deserialize, Serialize};

/// Messages exchanged with the messaging hub over a WebSocket text channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    // Device -> hub
    /// Announce this device to the hub
    Login {
        protocol_version: u32,
        device_address: String,
        device_name: String,
        pairing_secret: String,
    },
    /// Deliver a text message to a paired peer
    SendText { to: PeerId, text: String },

    // Hub -> device
    /// Login accepted, the device is reachable
    Ready,
    /// A peer completed pairing with this device
    Paired { from: PeerId },
    /// A peer sent a text message
    Text { from: PeerId, text: String },
    /// The hub asks the device to rotate its temporary keys
    RotateKeys,
    /// The hub rejected a request
    Error { message: String },
}

impl HubMessage {
    /// Whether this message is only ever sent by the hub
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            HubMessage::Ready
                | HubMessage::Paired { .. }
                | HubMessage::Text { .. }
                | HubMessage::RotateKeys
                | HubMessage::Error { .. }
        )
    }
}
