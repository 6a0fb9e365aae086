//! Codec for encoding/decoding hub messages

use crate::messages::HubMessage;
use thiserror::Error;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Unexpected frame from hub: {0}")]
    UnexpectedFrame(String),
}

/// Hub message codec
///
/// Each message travels as one JSON document in one WebSocket text frame.
pub struct HubCodec;

impl HubCodec {
    /// Maximum frame size (1MB)
    pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

    /// Encode a hub message into a text frame
    pub fn encode(msg: &HubMessage) -> Result<String, CodecError> {
        let frame = serde_json::to_string(msg)?;

        if frame.len() > Self::MAX_FRAME_SIZE {
            return Err(CodecError::MessageTooLarge(frame.len()));
        }

        Ok(frame)
    }

    /// Decode a text frame received from the hub
    ///
    /// Frames that only a device sends (login, send_text) are rejected.
    pub fn decode(frame: &str) -> Result<HubMessage, CodecError> {
        if frame.len() > Self::MAX_FRAME_SIZE {
            return Err(CodecError::MessageTooLarge(frame.len()));
        }

        let msg: HubMessage = serde_json::from_str(frame)?;
        if !msg.is_inbound() {
            return Err(CodecError::UnexpectedFrame(frame.to_string()));
        }

        Ok(msg)
    }
}
