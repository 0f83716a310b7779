//! # Envelope Headers
//!
//! The header set travels next to the base64 payload in every envelope:
//!
//! ```json
//! {
//!   "mc_sender": "n1",
//!   "reply-to": "mcollective.reply.n1.4242.0",
//!   "seen-by": [["n1", "nats://a:4222"], ["nats://b:4222", "n2"]],
//!   "federation": {"target": ["mcollective.node.n2"], "req": "abc", "reply-to": "..."}
//! }
//! ```
//!
//! Unknown header keys are preserved through [`Headers::extra`] so relays
//! never drop metadata they do not understand.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One provenance entry in a `seen-by` chain.
///
/// Hops are short arrays of strings; the usual shape is a pair of
/// identity and server address, but brokers record a single instance name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hop(Vec<String>);

impl Hop {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(vec![first.into(), second.into()])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

/// Cross-bridge routing metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationMarkup {
    /// Subjects the far-side broker must publish to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<String>,

    /// Correlation id of the originating request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req: Option<String>,

    /// Return path one hop back
    #[serde(rename = "reply-to", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl FederationMarkup {
    pub fn new(req: impl Into<String>, target: Vec<String>) -> Self {
        Self {
            target,
            req: Some(req.into()),
            reply_to: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Headers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mc_sender: Option<String>,

    #[serde(rename = "reply-to", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    #[serde(rename = "seen-by", default, skip_serializing_if = "Option::is_none")]
    pub seen_by: Option<Vec<Hop>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation: Option<FederationMarkup>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Headers {
    pub fn with_sender(sender: impl Into<String>) -> Self {
        Self {
            mc_sender: Some(sender.into()),
            ..Self::default()
        }
    }

    /// Append a hop when provenance tracking is on; no-op otherwise
    pub fn record_hop(&mut self, hop: Hop) -> bool {
        match self.seen_by.as_mut() {
            Some(chain) => {
                chain.push(hop);
                true
            }
            None => false,
        }
    }

    pub fn is_federated(&self) -> bool {
        self.federation.is_some()
    }
}
