use crate::{CodecError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use types::{Headers, PROTOCOL};

/// Wire representation of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    /// base64 encoded payload
    pub data: String,
    #[serde(default)]
    pub headers: Headers,
}

impl Envelope {
    /// Wrap a raw payload
    pub fn new(payload: &[u8], headers: Headers) -> Self {
        Self::encoded(encode_payload(payload), headers)
    }

    /// Wrap a payload that is already base64 encoded
    pub fn encoded(data: String, headers: Headers) -> Self {
        Self {
            protocol: PROTOCOL.to_string(),
            data,
            headers,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(CodecError::Serialize)
    }

    /// Parse a frame, rejecting foreign protocol tags
    pub fn from_slice(frame: &[u8]) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_slice(frame).map_err(|source| CodecError::InvalidJson {
                size: frame.len(),
                source,
            })?;

        if envelope.protocol != PROTOCOL {
            return Err(CodecError::UnsupportedProtocol {
                expected: PROTOCOL,
                actual: envelope.protocol,
            });
        }

        Ok(envelope)
    }

    pub fn payload(&self) -> Result<Vec<u8>> {
        decode_payload(&self.data)
    }
}

pub fn encode_payload(payload: &[u8]) -> String {
    STANDARD.encode(payload)
}

pub fn decode_payload(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data)
        .map_err(|source| CodecError::InvalidPayload {
            length: data.len(),
            source,
        })
}
