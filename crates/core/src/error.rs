//! Codec error model.

use thiserror::Error;

/// Result type used by the wire codec.
pub type CodecResult<T> = Result<T, CodecError>;

/// Wire codec error.
///
/// Keep this focused on payload shape failures. Transport and downstream
/// failures have their own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The payload is not a JSON object carrying the recognized task fields.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A task could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl CodecError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedPayload(_))
    }
}
