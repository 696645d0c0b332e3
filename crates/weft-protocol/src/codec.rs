//! JSON codec for protocol events.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message was empty.
    #[error("empty message")]
    Empty,
    /// The message was not a valid event.
    #[error("invalid message: {0}")]
    Decode(#[source] serde_json::Error),
    /// An event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
    /// An embedded base64 payload was malformed.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Decode one event from raw bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::Empty);
    }
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

/// Encode one event to bytes.
pub fn encode<T: Serialize>(event: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(event).map_err(ProtocolError::Encode)
}
