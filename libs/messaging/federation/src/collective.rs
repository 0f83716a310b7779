//! Collective side: replies leaving a collective for the federation.
//!
//! Consumes `choria.federation.{cluster}.collective`. A reply arrives here
//! because the federation processor pointed the request's `reply-to` at this
//! subject; the federation markup remembers where the reply must go next.

use crate::logic::{broker_hop, federated_headers, reassemble, take_headers};
use crate::{ProcessorLogic, Rejection, Result, WorkItem};
use serde_json::Value;
use tracing::debug;
use types::{subjects, FederationMarkup};

#[derive(Debug, Clone)]
pub struct CollectiveProcessor {
    cluster: String,
    instance: String,
    ingress: String,
}

impl CollectiveProcessor {
    pub fn new(cluster: impl Into<String>, instance: impl Into<String>) -> Self {
        let cluster = cluster.into();
        Self {
            ingress: subjects::collective_ingress(&cluster),
            cluster,
            instance: instance.into(),
        }
    }
}

impl ProcessorLogic for CollectiveProcessor {
    fn name(&self) -> &'static str {
        "collective"
    }

    fn subject(&self) -> String {
        self.ingress.clone()
    }

    fn queue_group(&self) -> String {
        subjects::queue_group(&self.cluster, "collective")
    }

    fn check(&self, message: &Value) -> std::result::Result<(), Rejection> {
        let headers = federated_headers(message)?;
        let markup = headers.federation.unwrap_or_default();

        if markup.reply_to.is_none() {
            return Err(Rejection::MissingFederationReplyTo);
        }

        if let Some(reply_to) = headers.reply_to {
            if reply_to != self.ingress {
                return Err(Rejection::Misrouted {
                    reply_to,
                    expected: self.ingress.clone(),
                });
            }
        }

        if markup.req.is_none() {
            return Err(Rejection::MissingRequestId);
        }
        Ok(())
    }

    /// Send the reply one hop back. The consumed `reply-to` is dropped and
    /// only the request id stays in the federation markup.
    fn process(&self, message: Value) -> Result<WorkItem> {
        let mut message = message;
        let mut headers = take_headers(&mut message)?;

        let markup = headers.federation.take().unwrap_or_default();
        let target = markup.reply_to.ok_or(Rejection::MissingFederationReplyTo)?;
        let req = markup.req.unwrap_or_default();

        headers.reply_to = None;
        headers.federation = Some(FederationMarkup {
            req: Some(req.clone()),
            ..FederationMarkup::default()
        });
        headers
            .seen_by
            .get_or_insert_with(Vec::new)
            .push(broker_hop(&self.instance));

        debug!(req = %req, target = %target, "Collective reply bound for federation");
        let data = reassemble(message, headers)?;
        Ok(WorkItem::new(vec![target], data, req))
    }
}
