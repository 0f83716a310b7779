//! # Processor Logic
//!
//! The half of a processor that decides what crosses the bridge. A
//! [`ProcessorLogic`] screens each inbound message with
//! [`check`](ProcessorLogic::check) and rewrites accepted ones into a
//! [`WorkItem`] with [`process`](ProcessorLogic::process). Connections,
//! queues and tasks belong to [`Processor`](crate::Processor).
//!
//! Messages are handled as raw JSON so envelope fields the broker does not
//! know about, including the payload, pass through untouched.

use crate::{BrokerError, Rejection, Result};
use bytes::Bytes;
use serde_json::Value;
use tracing::warn;
use types::{Headers, Hop};

/// One outbound unit: the same bytes published to every target
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub targets: Vec<String>,
    pub data: Bytes,
    pub req: String,
}

impl WorkItem {
    pub fn new(targets: Vec<String>, data: impl Into<Bytes>, req: impl Into<String>) -> Self {
        Self {
            targets,
            data: data.into(),
            req: req.into(),
        }
    }
}

pub trait ProcessorLogic: Send + Sync + 'static {
    /// Processor name used in logs, stats and task names
    fn name(&self) -> &'static str;

    /// Ingress subject this processor consumes
    fn subject(&self) -> String;

    /// Queue group shared by every broker instance of the same cluster
    fn queue_group(&self) -> String;

    /// First failed rule, in evaluation order
    fn check(&self, message: &Value) -> std::result::Result<(), Rejection>;

    /// Rewrite an accepted message for the other bus
    fn process(&self, message: Value) -> Result<WorkItem>;

    fn should_process(&self, message: &Value) -> bool {
        match self.check(message) {
            Ok(()) => true,
            Err(rejection) => {
                log_rejection(self.name(), &rejection);
                false
            }
        }
    }
}

pub(crate) fn log_rejection(processor: &str, rejection: &Rejection) {
    warn!(
        processor,
        reason = rejection.reason(),
        "Discarding message: {}",
        rejection
    );
}

/// Decode a raw frame; anything but JSON is rejected outright
pub fn parse_message(data: &[u8]) -> std::result::Result<Value, Rejection> {
    serde_json::from_slice(data).map_err(|e| Rejection::Unparseable {
        error: e.to_string(),
    })
}

/// Structure checks shared by both processors: an object with a headers
/// object carrying federation markup, all of it well typed.
pub(crate) fn federated_headers(message: &Value) -> std::result::Result<Headers, Rejection> {
    let object = message.as_object().ok_or(Rejection::NotStructured)?;

    let headers = match object.get("headers") {
        Some(headers @ Value::Object(_)) => headers,
        _ => return Err(Rejection::MissingHeaders),
    };

    match headers.get("federation") {
        Some(Value::Object(_)) => {}
        _ => return Err(Rejection::MissingFederation),
    }

    serde_json::from_value(headers.clone()).map_err(|e| Rejection::MalformedHeaders {
        error: e.to_string(),
    })
}

pub(crate) fn take_headers(message: &mut Value) -> Result<Headers> {
    let raw = message
        .get_mut("headers")
        .map(Value::take)
        .ok_or(BrokerError::Rejected(Rejection::MissingHeaders))?;
    Ok(serde_json::from_value(raw)?)
}

/// Put rewritten headers back and serialize the whole message
pub(crate) fn reassemble(mut message: Value, headers: Headers) -> Result<Bytes> {
    let headers = serde_json::to_value(headers)?;
    match message.as_object_mut() {
        Some(object) => {
            object.insert("headers".to_string(), headers);
        }
        None => return Err(BrokerError::Rejected(Rejection::NotStructured)),
    }
    Ok(Bytes::from(serde_json::to_vec(&message)?))
}

/// Broker hop as recorded in `seen-by`
pub(crate) fn broker_hop(instance: &str) -> Hop {
    Hop::new([instance])
}
