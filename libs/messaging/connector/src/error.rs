//! Connector Error Types

use codec::CodecError;
use network::TransportError;
use thiserror::Error;
use types::TypesError;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Unknown message kind '{0}'")]
    UnknownKind(String),

    #[error("Unknown network '{network}', configured networks: {}", .configured.join(", "))]
    UnknownNetwork {
        network: String,
        configured: Vec<String>,
    },

    /// A reply needs the reply-to subject of the request it answers
    #[error("Message {request_id} has no reply target")]
    MissingReplyTarget { request_id: String },

    /// One entry per failed send; sends to other targets were still attempted
    #[error("Publish failed for {} target(s)", .0.len())]
    Publish(Vec<PublishError>),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A single failed send
#[derive(Error, Debug)]
#[error("Publish to {target} failed: {source}")]
pub struct PublishError {
    pub target: String,
    #[source]
    pub source: TransportError,
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

impl ConnectorError {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }

    /// Failed sends carried by a `Publish` error
    pub fn publish_failures(&self) -> &[PublishError] {
        match self {
            Self::Publish(failures) => failures,
            _ => &[],
        }
    }
}

impl From<TypesError> for ConnectorError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::UnknownKind(kind) => Self::UnknownKind(kind),
        }
    }
}
