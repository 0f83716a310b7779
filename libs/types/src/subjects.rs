//! Subject naming shared by the connector and the federation broker.
//!
//! Subjects are dot-delimited and colon-free:
//!
//! - `{network}.reply.{identity}.{pid}.{sequence}`
//! - `{network}.broadcast.agent.{agent}`
//! - `{network}.node.{identity}`
//!
//! Identities are usually FQDNs and may contain dots; the reply and node
//! forms are parsed from their fixed tokens inward.
//! - `choria.federation.{network}.federation` (federation-side ingress)
//! - `choria.federation.{network}.collective` (collective-side ingress)

use crate::MessageKind;

pub const FEDERATION_PREFIX: &str = "choria.federation";

pub fn federation_ingress(network: &str) -> String {
    format!("{}.{}.federation", FEDERATION_PREFIX, network)
}

pub fn collective_ingress(network: &str) -> String {
    format!("{}.{}.collective", FEDERATION_PREFIX, network)
}

/// Queue group shared by every broker instance serving `network` on one side
pub fn queue_group(network: &str, side: &str) -> String {
    format!("{}_{}", network, side)
}

/// True for either broker ingress subject
pub fn is_federation_subject(subject: &str) -> bool {
    subject
        .strip_prefix(FEDERATION_PREFIX)
        .map(|rest| rest.starts_with('.'))
        .unwrap_or(false)
}

/// True for `{network}.reply.{identity}.{pid}.{sequence}`
pub fn is_reply_subject(subject: &str) -> bool {
    reply_identity(subject).is_some()
}

/// Identity embedded in a reply subject; pid and sequence must be numeric
fn reply_identity(subject: &str) -> Option<(&str, &str)> {
    let (network, rest) = subject.split_once('.')?;
    let rest = rest.strip_prefix("reply.")?;
    let (rest, sequence) = rest.rsplit_once('.')?;
    let (identity, pid) = rest.rsplit_once('.')?;
    let numeric = |token: &str| !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit());
    if network.is_empty() || !numeric(pid) || !numeric(sequence) || !valid_identity(identity) {
        return None;
    }
    Some((network, identity))
}

fn valid_identity(identity: &str) -> bool {
    !identity.is_empty() && identity.split('.').all(|label| !label.is_empty())
}

/// What a subject says about the message delivered on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectInfo {
    pub kind: MessageKind,
    pub network: String,
    pub agent: Option<String>,
    pub identity: Option<String>,
}

impl SubjectInfo {
    pub fn parse(subject: &str) -> Option<Self> {
        if let Some((network, identity)) = reply_identity(subject) {
            return Some(Self {
                kind: MessageKind::Reply,
                network: network.to_string(),
                agent: None,
                identity: Some(identity.to_string()),
            });
        }

        let (network, rest) = subject.split_once('.')?;
        if network.is_empty() {
            return None;
        }
        if let Some(identity) = rest.strip_prefix("node.") {
            return valid_identity(identity).then(|| Self {
                kind: MessageKind::DirectRequest,
                network: network.to_string(),
                agent: None,
                identity: Some(identity.to_string()),
            });
        }
        match rest.strip_prefix("broadcast.agent.") {
            Some(agent) if !agent.is_empty() && !agent.contains('.') => Some(Self {
                kind: MessageKind::Request,
                network: network.to_string(),
                agent: Some(agent.to_string()),
                identity: None,
            }),
            _ => None,
        }
    }
}
