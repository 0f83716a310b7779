//! # Message
//!
//! The unit of work before wire encoding. Requests are built with
//! [`Message::request`] or [`Message::directed`]; replies with
//! [`Message::reply`], which keeps the request headers so the envelope
//! builder can thread `seen-by` and re-attach federation markup.

use crate::{Headers, MessageKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    /// Logical service name
    pub agent: String,
    /// Logical network (collective) name
    pub network: String,
    /// Opaque body, base64 encoded on the wire
    pub payload: Vec<u8>,
    pub request_id: String,
    /// Subject replies must be published to
    pub reply_to: Option<String>,
    /// Node identities for directed sends; empty for broadcast
    pub discovered_hosts: Vec<String>,
    /// Headers as received, or extra headers to send
    pub headers: Headers,
    /// Headers of the request this message answers
    pub request: Option<Box<Headers>>,
}

impl Message {
    pub fn new(
        kind: MessageKind,
        agent: impl Into<String>,
        network: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            kind,
            agent: agent.into(),
            network: network.into(),
            payload: payload.into(),
            request_id: new_request_id(),
            reply_to: None,
            discovered_hosts: Vec::new(),
            headers: Headers::default(),
            request: None,
        }
    }

    /// Broadcast request to every node running `agent`
    pub fn request(
        agent: impl Into<String>,
        network: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(MessageKind::Request, agent, network, payload)
    }

    /// Request sent to each of `hosts` on its own node subject
    pub fn directed(
        agent: impl Into<String>,
        network: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        hosts: Vec<String>,
    ) -> Self {
        let mut message = Self::new(MessageKind::DirectRequest, agent, network, payload);
        message.discovered_hosts = hosts;
        message
    }

    /// Reply to `request`, addressed to the request's reply subject
    pub fn reply(request: &Message, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MessageKind::Reply,
            agent: request.agent.clone(),
            network: request.network.clone(),
            payload: payload.into(),
            request_id: request.request_id.clone(),
            reply_to: request
                .reply_to
                .clone()
                .or_else(|| request.headers.reply_to.clone()),
            discovered_hosts: Vec::new(),
            headers: Headers::default(),
            request: Some(Box::new(request.headers.clone())),
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.discovered_hosts = hosts;
        self
    }

    /// Federation markup on the request this message answers, if any
    pub fn request_federation(&self) -> Option<&crate::FederationMarkup> {
        self.request.as_ref().and_then(|h| h.federation.as_ref())
    }
}

/// 32 hex characters, unique per request
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
