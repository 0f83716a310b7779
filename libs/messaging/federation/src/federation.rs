//! Federation side: requests entering a collective from the federation.
//!
//! Consumes `choria.federation.{cluster}.federation`. The request's own
//! `reply-to` moves into the federation markup and is replaced by this
//! broker's collective ingress, so replies come back through the
//! [`CollectiveProcessor`](crate::CollectiveProcessor).

use crate::logic::{broker_hop, federated_headers, reassemble, take_headers};
use crate::{ProcessorLogic, Rejection, Result, WorkItem};
use serde_json::Value;
use tracing::debug;
use types::{subjects, FederationMarkup};

#[derive(Debug, Clone)]
pub struct FederationProcessor {
    cluster: String,
    instance: String,
    ingress: String,
    collective_ingress: String,
}

impl FederationProcessor {
    pub fn new(cluster: impl Into<String>, instance: impl Into<String>) -> Self {
        let cluster = cluster.into();
        Self {
            ingress: subjects::federation_ingress(&cluster),
            collective_ingress: subjects::collective_ingress(&cluster),
            cluster,
            instance: instance.into(),
        }
    }
}

impl ProcessorLogic for FederationProcessor {
    fn name(&self) -> &'static str {
        "federation"
    }

    fn subject(&self) -> String {
        self.ingress.clone()
    }

    fn queue_group(&self) -> String {
        subjects::queue_group(&self.cluster, "federation")
    }

    fn check(&self, message: &Value) -> std::result::Result<(), Rejection> {
        let headers = federated_headers(message)?;
        let markup = headers.federation.unwrap_or_default();

        let reply_to = headers.reply_to.ok_or(Rejection::MissingReplyTo)?;
        if !subjects::is_reply_subject(&reply_to) {
            return Err(Rejection::MalformedReplyTo { reply_to });
        }

        if let Some(target) = markup
            .target
            .iter()
            .find(|target| subjects::is_federation_subject(target))
        {
            return Err(Rejection::FederationTarget {
                target: target.clone(),
            });
        }

        if markup.target.is_empty() {
            return Err(Rejection::MissingTargets);
        }
        if markup.req.is_none() {
            return Err(Rejection::MissingRequestId);
        }
        Ok(())
    }

    fn process(&self, message: Value) -> Result<WorkItem> {
        let mut message = message;
        let mut headers = take_headers(&mut message)?;

        let markup = headers.federation.take().unwrap_or_default();
        let req = markup.req.unwrap_or_default();

        headers.federation = Some(FederationMarkup {
            target: Vec::new(),
            req: Some(req.clone()),
            reply_to: headers.reply_to.take(),
        });
        headers.reply_to = Some(self.collective_ingress.clone());
        headers.record_hop(broker_hop(&self.instance));

        debug!(req = %req, targets = markup.target.len(), "Federated request bound for collective");
        let data = reassemble(message, headers)?;
        Ok(WorkItem::new(markup.target, data, req))
    }
}
