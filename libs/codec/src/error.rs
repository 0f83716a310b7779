//! Envelope-level errors
//!
//! Each variant says which stage of decoding failed so a dropped frame can be
//! diagnosed from the log line alone.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame is not valid JSON or does not have the envelope shape
    #[error("Invalid envelope JSON ({size} bytes): {source}")]
    InvalidJson {
        size: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Envelope carries a protocol tag this codec does not speak
    #[error("Unsupported protocol '{actual}', expected '{expected}'")]
    UnsupportedProtocol { expected: &'static str, actual: String },

    /// `data` field is not valid base64
    #[error("Invalid base64 payload ({length} chars): {source}")]
    InvalidPayload {
        length: usize,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Envelope serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
