//! Message kinds and their parsing table.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The addressing intent of a message.
///
/// `Request` and `Broadcast` go to a shared agent subject, `DirectRequest`
/// and `Directed` go to one node subject per identity, `Reply` goes to the
/// reply subject recorded on the originating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    DirectRequest,
    Directed,
    Reply,
    Broadcast,
}

impl MessageKind {
    /// Every known kind, in declaration order
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Request,
        MessageKind::DirectRequest,
        MessageKind::Directed,
        MessageKind::Reply,
        MessageKind::Broadcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::DirectRequest => "direct_request",
            MessageKind::Directed => "directed",
            MessageKind::Reply => "reply",
            MessageKind::Broadcast => "broadcast",
        }
    }

    /// Sent to one node subject per discovered host
    pub fn is_directed(&self) -> bool {
        matches!(self, MessageKind::DirectRequest | MessageKind::Directed)
    }

    /// Expects replies, so needs a reply-to subject
    pub fn is_request(&self) -> bool {
        !matches!(self, MessageKind::Reply)
    }
}

impl FromStr for MessageKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TypesError::UnknownKind(s.to_string()))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
