//! # Target Resolver
//!
//! Turns an addressing intent into a subject name:
//!
//! | kind                          | subject                                        |
//! |-------------------------------|------------------------------------------------|
//! | `reply`                       | `{network}.reply.{identity}.{pid}.{sequence}`  |
//! | `broadcast`, `request`        | `{network}.broadcast.agent.{agent}`            |
//! | `direct_request`, `directed`  | `{network}.node.{identity}`                    |
//!
//! `identity` defaults to the local node. Resolution does no I/O; the only
//! state it touches is the reply sequence in [`ConnectorContext`].

use crate::{ConnectorContext, ConnectorError, Result};
use std::sync::Arc;
use types::MessageKind;

#[derive(Debug, Clone)]
pub struct TargetResolver {
    context: Arc<ConnectorContext>,
}

impl TargetResolver {
    pub fn new(context: Arc<ConnectorContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ConnectorContext {
        &self.context
    }

    pub fn resolve(
        &self,
        agent: &str,
        kind: MessageKind,
        network: &str,
        identity: Option<&str>,
    ) -> Result<String> {
        self.check_network(network)?;
        let identity = identity.unwrap_or(self.context.identity());

        Ok(match kind {
            MessageKind::Reply => format!(
                "{}.reply.{}.{}.{}",
                network,
                identity,
                self.context.pid(),
                self.context.next_reply_sequence()
            ),
            MessageKind::Broadcast | MessageKind::Request => {
                format!("{}.broadcast.agent.{}", network, agent)
            }
            MessageKind::DirectRequest | MessageKind::Directed => {
                format!("{}.node.{}", network, identity)
            }
        })
    }

    /// [`resolve`](Self::resolve) with the kind given by name
    pub fn resolve_named(
        &self,
        agent: &str,
        kind: &str,
        network: &str,
        identity: Option<&str>,
    ) -> Result<String> {
        let kind: MessageKind = kind.parse()?;
        self.resolve(agent, kind, network, identity)
    }

    /// Wildcard covering every reply subject this process hands out
    pub fn reply_subscription(&self, network: &str) -> Result<String> {
        self.check_network(network)?;
        Ok(format!(
            "{}.reply.{}.{}.>",
            network,
            self.context.identity(),
            self.context.pid()
        ))
    }

    fn check_network(&self, network: &str) -> Result<()> {
        if self.context.is_configured(network) {
            Ok(())
        } else {
            Err(ConnectorError::UnknownNetwork {
                network: network.to_string(),
                configured: self.context.networks().to_vec(),
            })
        }
    }
}
