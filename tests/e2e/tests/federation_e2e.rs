//! Federated request/reply across the broker, end to end.

use fleetbus_e2e_tests::fixtures::{collect_replies, replier, AGENT, COLLECTIVE};
use fleetbus_e2e_tests::{
    BroadcastScenario, ChunkedDirectedScenario, FederatedTopology, RejectionScenario,
    TestConfig, TestFramework, TestScenario,
};
use health_check::{ReporterInfo, StatsReporter, StatsServer, StatsSource};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use types::Message;

fn framework() -> TestFramework {
    TestFramework::new(TestConfig::default())
}

#[tokio::test]
async fn broadcast_scenario_passes() {
    let result = framework().run_scenario(&BroadcastScenario::new(3)).await;
    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.metrics.replies_received, 3);
    // one request in, three replies out
    assert_eq!(result.metrics.broker_accepted, 4);
}

#[tokio::test]
async fn chunked_directed_scenario_passes() {
    let scenario = ChunkedDirectedScenario::new(201, vec![0, 200]);
    let result = framework().run_scenario(&scenario).await;
    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.metrics.requests_sent, 2);
    assert_eq!(result.metrics.replies_received, 2);
}

#[tokio::test]
async fn rejection_scenario_passes() {
    let result = framework().run_scenario(&RejectionScenario::new()).await;
    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.metrics.broker_rejected, 3);
    assert_eq!(result.metrics.broker_accepted, 0);
}

#[tokio::test]
async fn failing_scenario_is_reported() {
    struct Failing;

    #[async_trait::async_trait]
    impl TestScenario for Failing {
        async fn setup(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn execute(&self) -> anyhow::Result<fleetbus_e2e_tests::TestMetrics> {
            anyhow::bail!("boom")
        }
        async fn cleanup(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    let result = framework().run_scenario(&Failing).await;
    assert!(!result.success);
    assert_eq!(result.error_message.as_deref(), Some("Execution failed: boom"));
}

#[tokio::test]
async fn fqdn_identities_round_trip() {
    let mut topology = FederatedTopology::start(100).await.unwrap();
    topology.spawn_node("web1.example.net").await.unwrap();
    topology.spawn_node("web2.example.net").await.unwrap();
    let client = topology.client("client.example.net").await.unwrap();

    client
        .publish(&Message::request(AGENT, COLLECTIVE, "ping"))
        .await
        .unwrap();
    let replies = collect_replies(&client, 2, Duration::from_secs(2)).await.unwrap();
    let mut repliers: Vec<String> = replies.iter().map(replier).collect();
    repliers.sort();
    assert_eq!(repliers, ["web1.example.net", "web2.example.net"]);
    assert!(replies.iter().all(|r| r.kind == types::MessageKind::Reply));

    client
        .publish(&Message::directed(
            AGENT,
            COLLECTIVE,
            "ping",
            vec!["web2.example.net".into()],
        ))
        .await
        .unwrap();
    let replies = collect_replies(&client, 1, Duration::from_secs(2)).await.unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replier(&replies[0]), "web2.example.net");

    let processors = topology.broker.processors();
    assert_eq!(processors["federation"].rejected, 0, "{:?}", processors["federation"].rejections);
    assert_eq!(processors["collective"].rejected, 0);

    topology.shutdown().await.unwrap();
}

#[tokio::test]
async fn reply_arrives_after_collective_outage() {
    let mut topology = FederatedTopology::start(100).await.unwrap();
    topology.spawn_node("n1").await.unwrap();
    let client = topology.client("c1").await.unwrap();

    topology.collective.set_online(false);
    tokio::time::timeout(Duration::from_secs(2), async {
        while topology.broker.is_healthy() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    topology.collective.set_online(true);

    // reconnect wait is 1s by default
    tokio::time::timeout(Duration::from_secs(5), async {
        while !topology.broker.is_healthy() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    // the node reconnects on its own schedule
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio_test::assert_ok!(
        client
            .publish(&Message::directed(AGENT, COLLECTIVE, "ping", vec!["n1".into()]))
            .await
    );
    let replies = collect_replies(&client, 1, Duration::from_secs(2)).await.unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replier(&replies[0]), "n1");

    topology.shutdown().await.unwrap();
}

#[tokio::test]
async fn stats_endpoint_reports_broker() {
    let mut topology = FederatedTopology::start(100).await.unwrap();
    topology.spawn_node("n1").await.unwrap();
    let client = topology.client("c1").await.unwrap();
    client
        .publish(&Message::request(AGENT, COLLECTIVE, "ping"))
        .await
        .unwrap();
    collect_replies(&client, 1, Duration::from_secs(2)).await.unwrap();

    let source: Arc<dyn StatsSource> = topology.broker.clone();
    let reporter = Arc::new(StatsReporter::new(
        ReporterInfo {
            version: "test".into(),
            cluster: "production".into(),
            instance: "broker1".into(),
            config_file: None,
        },
        source,
    ));

    let addr: SocketAddr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let server = StatsServer::new(reporter, addr.port()).with_address(addr);
    let handle = tokio::spawn(async move { server.start().await });

    let client = hyper::Client::new();
    let uri: hyper::Uri = format!("http://{}/stats", addr).parse().unwrap();
    let response = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.get(uri.clone()).await {
                Ok(response) => break response,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(response.status(), hyper::StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["status"], "OK");
    assert_eq!(stats["cluster"], "production");
    assert_eq!(stats["processors"]["federation"]["accepted"], 1);
    assert_eq!(stats["processors"]["collective"]["state"], "connected");
    assert_eq!(stats["threads"]["federation_dispatcher"], true);

    handle.abort();
    tokio_test::assert_ok!(topology.shutdown().await);
}
