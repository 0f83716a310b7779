//! Broker Error Types

use network::TransportError;
use thiserror::Error;

/// Why a processor refused to forward a message.
///
/// Every variant has its own log line; [`Rejection::reason`] is the key the
/// rejection is counted under in processor stats.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("message is not valid JSON: {error}")]
    Unparseable { error: String },

    #[error("message is not a JSON object")]
    NotStructured,

    #[error("message has no headers")]
    MissingHeaders,

    #[error("headers carry no federation markup")]
    MissingFederation,

    #[error("headers are malformed: {error}")]
    MalformedHeaders { error: String },

    #[error("federation markup has no reply-to")]
    MissingFederationReplyTo,

    #[error("reply-to {reply_to} is not this broker's ingress {expected}")]
    Misrouted { reply_to: String, expected: String },

    #[error("message has no reply-to")]
    MissingReplyTo,

    #[error("reply-to {reply_to} is not a reply subject")]
    MalformedReplyTo { reply_to: String },

    #[error("federation target {target} is a federation subject, refusing to loop")]
    FederationTarget { target: String },

    #[error("federation markup has no targets")]
    MissingTargets,

    #[error("federation markup has no request id")]
    MissingRequestId,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unparseable { .. } => "unparseable",
            Self::NotStructured => "not_structured",
            Self::MissingHeaders => "missing_headers",
            Self::MissingFederation => "missing_federation",
            Self::MalformedHeaders { .. } => "malformed_headers",
            Self::MissingFederationReplyTo => "missing_federation_reply_to",
            Self::Misrouted { .. } => "misrouted",
            Self::MissingReplyTo => "missing_reply_to",
            Self::MalformedReplyTo { .. } => "malformed_reply_to",
            Self::FederationTarget { .. } => "federation_target",
            Self::MissingTargets => "missing_targets",
            Self::MissingRequestId => "missing_request_id",
        }
    }
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Message encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Processor {0} already started")]
    AlreadyStarted(String),

    #[error("Broker is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, BrokerError>;
