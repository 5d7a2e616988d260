//! Frame codec for the live message channel.
//!
//! The server pushes one JSON-encoded [`Message`] per WebSocket frame.
//! Frames may arrive as text or binary; both carry UTF-8 JSON.

use crate::message::Message;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame payload was not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The frame payload was not a valid JSON message.
    #[error("frame is not a valid message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a single inbound frame into a [`Message`].
///
/// # Errors
///
/// Returns [`CodecError`] if the payload is not UTF-8 or does not parse
/// as a message object. Callers are expected to log and skip bad frames
/// rather than tear the connection down.
pub fn decode_frame(payload: &[u8]) -> Result<Message, CodecError> {
    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

/// Encodes a [`Message`] as a JSON text frame payload.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_frame(msg: &Message) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}
