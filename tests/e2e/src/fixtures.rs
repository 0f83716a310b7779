//! In-process federated topology: two buses, one broker, any number of nodes
//!
//! ```text
//!  federation bus ("federation")          collective bus ("collective")
//!     client c1  ──►  broker (production)  ──►  nodes n0..nN
//!                ◄──                       ◄──
//! ```

use anyhow::{Context, Result};
use connector::{Connector, ConnectorContext, ConnectorError};
use federation::{BrokerSettings, FederationBroker};
use network::{ConnectOptions, MemoryCluster};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::Message;

/// Federation network the broker serves
pub const FEDERATION: &str = "production";
/// Collective network the nodes live on
pub const COLLECTIVE: &str = "mcollective";
pub const AGENT: &str = "echo";
pub const BROKER_INSTANCE: &str = "broker1";

pub struct FederatedTopology {
    pub collective: Arc<MemoryCluster>,
    pub federation: Arc<MemoryCluster>,
    pub broker: Arc<FederationBroker>,
    nodes: Vec<(String, JoinHandle<()>)>,
}

impl FederatedTopology {
    pub async fn start(queue_capacity: usize) -> Result<Self> {
        let collective = MemoryCluster::new("collective");
        let federation = MemoryCluster::new("federation");

        let settings = BrokerSettings {
            cluster: FEDERATION.to_string(),
            instance: BROKER_INSTANCE.to_string(),
            queue_capacity,
            collective: ConnectOptions::new(BROKER_INSTANCE, vec![collective.url()]),
            federation: ConnectOptions::new(BROKER_INSTANCE, vec![federation.url()]),
        };
        let broker = Arc::new(FederationBroker::new(
            settings,
            Arc::new(collective.transport()),
            Arc::new(federation.transport()),
        ));
        broker.start().await.context("Failed to start broker")?;
        info!("Federated topology ready");

        Ok(Self {
            collective,
            federation,
            broker,
            nodes: Vec::new(),
        })
    }

    /// A federated client on the federation bus, already listening for replies
    pub async fn client(&self, identity: &str) -> Result<Connector> {
        let context = ConnectorContext::new(identity, vec![COLLECTIVE.to_string()])
            .with_federations(vec![FEDERATION.to_string()])
            .with_seen_by(true);
        let client = Connector::new(Arc::new(context), Arc::new(self.federation.transport()));
        client.connect().await?;
        client.subscribe_replies(COLLECTIVE).await?;
        Ok(client)
    }

    /// A node on the collective bus answering every request with
    /// `{identity}:{payload}`
    pub async fn spawn_node(&mut self, identity: &str) -> Result<()> {
        let context = ConnectorContext::new(identity, vec![COLLECTIVE.to_string()]);
        let node = Connector::new(Arc::new(context), Arc::new(self.collective.transport()));
        node.connect().await?;
        node.subscribe_agent(AGENT, COLLECTIVE).await?;
        node.subscribe_node(COLLECTIVE).await?;

        let name = identity.to_string();
        let handle = tokio::spawn(async move {
            loop {
                let request = match node.receive().await {
                    Ok(request) => request,
                    Err(ConnectorError::ConnectionClosed) => break,
                    Err(e) => {
                        warn!(node = %name, error = %e, "Receive failed");
                        continue;
                    }
                };

                let mut payload = format!("{}:", name).into_bytes();
                payload.extend_from_slice(&request.payload);
                if let Err(e) = node.publish(&Message::reply(&request, payload)).await {
                    warn!(node = %name, error = %e, "Reply failed");
                }
            }
            debug!(node = %name, "Node stopped");
        });

        self.nodes.push((identity.to_string(), handle));
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.broker.stop().await?;
        for (_, handle) in self.nodes {
            handle.abort();
        }
        Ok(())
    }
}

/// Wait for `expected` replies, giving up after `wait` without a new one
pub async fn collect_replies(
    client: &Connector,
    expected: usize,
    wait: Duration,
) -> Result<Vec<Message>> {
    let mut replies = Vec::with_capacity(expected);
    while replies.len() < expected {
        match tokio::time::timeout(wait, client.receive()).await {
            Ok(reply) => replies.push(reply?),
            Err(_) => break,
        }
    }
    Ok(replies)
}

/// Identity of the node that produced an echo reply
pub fn replier(reply: &Message) -> String {
    let text = String::from_utf8_lossy(&reply.payload);
    text.split(':').next().unwrap_or_default().to_string()
}
