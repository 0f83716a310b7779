//! Federation broker binary
//!
//! Usage:
//!   federation-broker --config config/broker.toml
//!   federation-broker --config config/broker.toml --json-logs
//!   federation-broker --config config/broker.toml --memory

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use federation::{BrokerSettings, FederationBroker};
use fleetbus_config::{FleetConfig, TlsConfig};
use health_check::{ReporterInfo, StatsReporter, StatsServer};
use network::{ConnectOptions, MemoryCluster, NatsTransport, TlsContext, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "federation-broker")]
#[command(about = "Bridges a collective bus and a federation bus")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level or filter directive, overridden by RUST_LOG
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Run both sides on in-process buses instead of NATS
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Starting federation broker");
    info!("Configuration: {:?}", args.config);

    let config = FleetConfig::load(&args.config).map_err(|e| {
        error!("Failed to load configuration: {:#}", e);
        e
    })?;
    let settings = broker_settings(&config)?;
    let stats_port = config.broker()?.stats_port;

    let (collective, federation) = transports(args.memory);
    let broker = Arc::new(FederationBroker::new(
        settings.clone(),
        collective,
        federation,
    ));

    let reporter = Arc::new(StatsReporter::new(
        ReporterInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            cluster: settings.cluster.clone(),
            instance: settings.instance.clone(),
            config_file: Some(args.config.display().to_string()),
        },
        broker.clone(),
    ));

    let stats_task = if stats_port == 0 {
        info!("Stats endpoint disabled");
        None
    } else {
        let server = StatsServer::new(reporter, stats_port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Stats server failed: {:#}", e);
            }
        }))
    };

    tokio::select! {
        result = broker.start() => {
            result.context("Failed to start federation broker")?;
        }
        _ = shutdown_signal() => {
            warn!("Shutdown requested before the broker connected");
            return Ok(());
        }
    }

    shutdown_signal().await;
    info!("Received shutdown signal");

    broker
        .stop()
        .await
        .context("Failed to stop federation broker")?;
    if let Some(task) = stats_task {
        task.abort();
    }

    info!("Federation broker exited");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .with_context(|| format!("Invalid log level {:?}", args.log_level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if args.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialise logging: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Connection settings for both sides of the broker
fn broker_settings(config: &FleetConfig) -> Result<BrokerSettings> {
    let broker = config.broker()?;
    let tls = config.tls.as_ref().map(tls_context);
    let reconnect_wait = config.connector.reconnect_wait();
    let instance = broker.instance_name().to_string();

    let options = |side: &str, servers: &[String]| {
        ConnectOptions::new(format!("{}_{}", instance, side), servers.to_vec())
            .with_tls(tls.clone())
            .with_reconnect_wait(reconnect_wait)
    };

    Ok(BrokerSettings {
        cluster: broker.cluster.clone(),
        instance: instance.clone(),
        queue_capacity: broker.queue_capacity,
        collective: options("collective", &broker.collective.servers),
        federation: options("federation", &broker.federation.servers),
    })
}

fn tls_context(tls: &TlsConfig) -> TlsContext {
    TlsContext {
        ca: tls.ca.clone(),
        cert: tls.cert.clone(),
        key: tls.key.clone(),
    }
}

fn transports(memory: bool) -> (Arc<dyn Transport>, Arc<dyn Transport>) {
    if memory {
        info!("Using in-process buses");
        (
            Arc::new(MemoryCluster::new("collective").transport()),
            Arc::new(MemoryCluster::new("federation").transport()),
        )
    } else {
        (Arc::new(NatsTransport::new()), Arc::new(NatsTransport::new()))
    }
}
