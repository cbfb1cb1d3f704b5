//! On-disk codec for the event sequence.
//!
//! The encoding is a strategy chosen once at bus construction; the only
//! contract is the byte round trip `decode(encode(events)) == events`,
//! including the empty sequence. The default is bincode over serde.

use crate::event::Event;

/// Error from an encode or decode attempt.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(String);

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Encode/decode pair for the stored event sequence.
pub trait LogCodec: Send + Sync {
    fn encode(&self, events: &[Event]) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Event>, CodecError>;
}

/// Default codec: bincode over the serde representation of [`Event`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl LogCodec for BincodeCodec {
    fn encode(&self, events: &[Event]) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(events).map_err(|e| CodecError::new(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Event>, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::new(e.to_string()))
    }
}
