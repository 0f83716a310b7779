//! # Envelope Builder
//!
//! Computes the header set and destination for an outbound message.
//!
//! - `mc_sender` is always the local identity.
//! - Requests get a `reply-to`: a fresh reply subject, unless the message is
//!   being relayed and already has one.
//! - Replies need the request's reply subject and carry no `reply-to`.
//! - `seen-by` is threaded through when tracking is on: requests start an
//!   empty chain, replies copy the request's chain and append
//!   `[identity, server]`.

use crate::{ConnectorError, Result, TargetResolver};
use types::{Headers, Hop, Message, MessageKind, Target};

#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    resolver: TargetResolver,
}

impl EnvelopeBuilder {
    pub fn new(resolver: TargetResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    /// `server` is the address of the bus server this node is connected to
    pub fn headers_for(&self, message: &Message, server: Option<&str>) -> Result<Headers> {
        let context = self.resolver.context();
        let mut headers = message.headers.clone();
        headers.mc_sender = Some(context.identity().to_string());

        if message.kind == MessageKind::Reply {
            if message.reply_to.is_none() {
                return Err(ConnectorError::MissingReplyTarget {
                    request_id: message.request_id.clone(),
                });
            }
            headers.reply_to = None;

            let chain = message
                .request
                .as_ref()
                .and_then(|request| request.seen_by.clone())
                .or_else(|| headers.seen_by.take());
            headers.seen_by = chain.map(|mut chain| {
                chain.push(Hop::pair(context.identity(), server.unwrap_or_default()));
                chain
            });
            return Ok(headers);
        }

        if context.records_seen_by() {
            headers.seen_by.get_or_insert_with(Vec::new);
        }

        let reply_to = match message.reply_to.as_ref().or(message.headers.reply_to.as_ref()) {
            Some(reply_to) => reply_to.clone(),
            None => self.resolver.resolve(
                &message.agent,
                MessageKind::Reply,
                &message.network,
                None,
            )?,
        };
        headers.reply_to = Some(reply_to);

        Ok(headers)
    }

    /// Destination for a single send. Replies go to their stored
    /// `reply-to`; everything else is resolved from kind, network and agent.
    pub fn target_for(
        &self,
        message: &Message,
        identity: Option<&str>,
        server: Option<&str>,
    ) -> Result<Target> {
        let headers = self.headers_for(message, server)?;

        let name = match message.kind {
            MessageKind::Reply => message.reply_to.clone().ok_or_else(|| {
                ConnectorError::MissingReplyTarget {
                    request_id: message.request_id.clone(),
                }
            })?,
            kind => self
                .resolver
                .resolve(&message.agent, kind, &message.network, identity)?,
        };

        Ok(Target::new(name, headers))
    }
}
