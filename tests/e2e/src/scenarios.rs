//! End-to-end federation scenarios

use crate::fixtures::{collect_replies, replier, FederatedTopology, AGENT, COLLECTIVE, FEDERATION};
use crate::framework::{TestMetrics, TestScenario};
use anyhow::{ensure, Context, Result};
use bytes::Bytes;
use codec::Envelope;
use health_check::StatsSource;
use network::{ConnectOptions, Transport};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::Mutex;
use types::{subjects, FederationMarkup, Headers, Message, FEDERATION_BATCH_SIZE};

const REPLY_WAIT: Duration = Duration::from_secs(2);

/// Holds the topology between setup and cleanup
#[derive(Default)]
struct Slot(Mutex<Option<FederatedTopology>>);

impl Slot {
    async fn fill(&self, topology: FederatedTopology) {
        *self.0.lock().await = Some(topology);
    }

    async fn release(&self) -> Result<()> {
        match self.0.lock().await.take() {
            Some(topology) => topology.shutdown().await,
            None => Ok(()),
        }
    }
}

fn broker_metrics(topology: &FederatedTopology, requests: u64, replies: u64) -> TestMetrics {
    let processors = topology.broker.processors();
    TestMetrics {
        requests_sent: requests,
        replies_received: replies,
        broker_accepted: processors.values().map(|p| p.accepted).sum(),
        broker_rejected: processors.values().map(|p| p.rejected).sum(),
    }
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) -> Result<()> {
    tokio::time::timeout(REPLY_WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .with_context(|| format!("Timed out waiting for {}", what))
}

/// A federated broadcast reaches every node and every reply comes back
pub struct BroadcastScenario {
    pub nodes: usize,
    slot: Slot,
}

impl BroadcastScenario {
    pub fn new(nodes: usize) -> Self {
        Self {
            nodes,
            slot: Slot::default(),
        }
    }
}

#[async_trait::async_trait]
impl TestScenario for BroadcastScenario {
    async fn setup(&self) -> Result<()> {
        let mut topology = FederatedTopology::start(1_000).await?;
        for i in 0..self.nodes {
            topology.spawn_node(&format!("n{}", i)).await?;
        }
        self.slot.fill(topology).await;
        Ok(())
    }

    async fn execute(&self) -> Result<TestMetrics> {
        let guard = self.slot.0.lock().await;
        let topology = guard.as_ref().context("Topology not set up")?;

        let client = topology.client("c1").await?;
        let request = Message::request(AGENT, COLLECTIVE, "ping");
        client.publish(&request).await?;

        let replies = collect_replies(&client, self.nodes, REPLY_WAIT).await?;
        ensure!(
            replies.len() == self.nodes,
            "Expected {} replies, got {}",
            self.nodes,
            replies.len()
        );
        ensure!(
            replies.iter().all(|r| r.request_id == request.request_id),
            "Reply with foreign request id"
        );
        let repliers: BTreeSet<String> = replies.iter().map(replier).collect();
        ensure!(repliers.len() == self.nodes, "Duplicate replies: {:?}", repliers);

        Ok(broker_metrics(topology, 1, replies.len() as u64))
    }

    async fn cleanup(&self) -> Result<()> {
        self.slot.release().await
    }

    fn name(&self) -> &str {
        "broadcast"
    }

    fn description(&self) -> &str {
        "Federated broadcast request answered by every node in the collective"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

/// A directed request larger than one federation batch is split into
/// batches; every host is published to and only running nodes reply
pub struct ChunkedDirectedScenario {
    pub hosts: usize,
    pub running: Vec<usize>,
    slot: Slot,
}

impl ChunkedDirectedScenario {
    pub fn new(hosts: usize, running: Vec<usize>) -> Self {
        Self {
            hosts,
            running,
            slot: Slot::default(),
        }
    }

    fn batches(&self) -> u64 {
        self.hosts.div_ceil(FEDERATION_BATCH_SIZE) as u64
    }
}

#[async_trait::async_trait]
impl TestScenario for ChunkedDirectedScenario {
    async fn setup(&self) -> Result<()> {
        let mut topology = FederatedTopology::start(1_000).await?;
        for i in &self.running {
            topology.spawn_node(&format!("n{}", i)).await?;
        }
        self.slot.fill(topology).await;
        Ok(())
    }

    async fn execute(&self) -> Result<TestMetrics> {
        let guard = self.slot.0.lock().await;
        let topology = guard.as_ref().context("Topology not set up")?;

        let client = topology.client("c1").await?;
        let hosts = (0..self.hosts).map(|i| format!("n{}", i)).collect();
        let request = Message::directed(AGENT, COLLECTIVE, "ping", hosts);
        client.publish(&request).await?;

        let replies = collect_replies(&client, self.running.len(), REPLY_WAIT).await?;
        let repliers: BTreeSet<String> = replies.iter().map(replier).collect();
        let expected: BTreeSet<String> = self.running.iter().map(|i| format!("n{}", i)).collect();
        ensure!(repliers == expected, "Replies from {:?}, expected {:?}", repliers, expected);

        let hosts = self.hosts as u64;
        wait_for("requests on the collective bus", || {
            topology.broker.processors()["collective"].sent >= hosts
        })
        .await?;

        let processors = topology.broker.processors();
        ensure!(
            processors["federation"].received == self.batches(),
            "Expected {} batches at the broker, got {}",
            self.batches(),
            processors["federation"].received
        );
        ensure!(
            processors["collective"].sent == hosts,
            "Expected {} node publishes, got {}",
            hosts,
            processors["collective"].sent
        );

        Ok(broker_metrics(topology, self.batches(), replies.len() as u64))
    }

    async fn cleanup(&self) -> Result<()> {
        self.slot.release().await
    }

    fn name(&self) -> &str {
        "chunked_directed"
    }

    fn description(&self) -> &str {
        "Directed request to more hosts than fit one federation batch"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

/// Malformed and looping requests are dropped at the broker
pub struct RejectionScenario {
    slot: Slot,
}

impl RejectionScenario {
    pub fn new() -> Self {
        Self {
            slot: Slot::default(),
        }
    }
}

impl Default for RejectionScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TestScenario for RejectionScenario {
    async fn setup(&self) -> Result<()> {
        let mut topology = FederatedTopology::start(16).await?;
        topology.spawn_node("n0").await?;
        self.slot.fill(topology).await;
        Ok(())
    }

    async fn execute(&self) -> Result<TestMetrics> {
        let guard = self.slot.0.lock().await;
        let topology = guard.as_ref().context("Topology not set up")?;

        let sender = topology.federation.transport();
        sender.start(ConnectOptions::new("sender", Vec::new())).await?;
        let ingress = subjects::federation_ingress(FEDERATION);

        let mut looping = Headers::with_sender("c1");
        looping.reply_to = Some(format!("{}.reply.c1.1.0", COLLECTIVE));
        looping.federation = Some(FederationMarkup::new(
            "r1",
            vec![subjects::federation_ingress("elsewhere")],
        ));

        let mut unanswerable = Headers::with_sender("c1");
        unanswerable.federation = Some(FederationMarkup::new(
            "r2",
            vec![format!("{}.node.n0", COLLECTIVE)],
        ));

        let frames = [
            Bytes::from_static(b"\x00not json"),
            Bytes::from(Envelope::new(b"ping", looping).to_bytes()?),
            Bytes::from(Envelope::new(b"ping", unanswerable).to_bytes()?),
        ];
        for frame in &frames {
            sender.publish(&ingress, frame.clone(), None).await?;
        }

        let expected = frames.len() as u64;
        wait_for("rejections", || {
            topology.broker.processors()["federation"].rejected >= expected
        })
        .await?;

        let processors = topology.broker.processors();
        let federation = &processors["federation"];
        for reason in ["unparseable", "federation_target", "missing_reply_to"] {
            ensure!(
                federation.rejections.get(reason) == Some(&1),
                "Missing {} rejection in {:?}",
                reason,
                federation.rejections
            );
        }
        ensure!(
            processors["collective"].sent == 0,
            "Rejected request reached the collective"
        );

        Ok(broker_metrics(topology, expected, 0))
    }

    async fn cleanup(&self) -> Result<()> {
        self.slot.release().await
    }

    fn name(&self) -> &str {
        "rejection"
    }

    fn description(&self) -> &str {
        "Unparseable, looping and unanswerable requests never reach the collective"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}
