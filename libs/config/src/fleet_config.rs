//! Fleet Configuration Module
//!
//! Loads connector and broker configuration from a TOML file with
//! environment overrides (`FLEETBUS_` prefix, `__` between nested keys):
//!
//! ```toml
//! [connector]
//! identity = "n1"
//! networks = ["mcollective"]
//! federations = []
//! record_seen_by = false
//! servers = ["nats://localhost:4222"]
//!
//! [broker]
//! cluster = "production"
//! instance = "broker1"
//! stats_port = 8222
//!
//! [broker.collective]
//! servers = ["nats://collective:4222"]
//!
//! [broker.federation]
//! servers = ["nats://federation:4222"]
//! ```

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "FLEETBUS";
pub const DEFAULT_RECONNECT_WAIT_MS: u64 = 1000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FleetConfig {
    pub connector: ConnectorConfig,

    /// TLS material handed to the transport untouched
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    #[serde(default)]
    pub broker: Option<BrokerConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConnectorConfig {
    /// This node's identity, used in `mc_sender` and reply subjects
    pub identity: String,

    /// Configured collectives; the first one is the main network
    pub networks: Vec<String>,

    /// Federation networks; non-empty means requests go through brokers
    #[serde(default)]
    pub federations: Vec<String>,

    #[serde(default)]
    pub record_seen_by: bool,

    pub servers: Vec<String>,

    #[serde(default = "default_reconnect_wait_ms")]
    pub reconnect_wait_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BrokerConfig {
    /// Federation network name this broker serves
    pub cluster: String,

    /// Instance name recorded in `seen-by`; defaults to the cluster name
    #[serde(default)]
    pub instance: Option<String>,

    /// Stats endpoint port; 0 disables it
    #[serde(default)]
    pub stats_port: u16,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    pub collective: SideConfig,
    pub federation: SideConfig,
}

/// One bus a broker processor connects to
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SideConfig {
    pub servers: Vec<String>,
}

fn default_reconnect_wait_ms() -> u64 {
    DEFAULT_RECONNECT_WAIT_MS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl FleetConfig {
    /// Load configuration from a file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand_path(path).context("Failed to expand config path")?;
        info!("Loading configuration: {:?}", path);

        let builder = Config::builder().add_source(File::from(path.as_path()).required(true));
        Self::finish(builder.add_source(environment()))
    }

    /// Parse TOML text with environment overrides
    pub fn from_toml(text: &str) -> Result<Self> {
        Self::from_toml_with(text, environment())
    }

    fn from_toml_with(text: &str, environment: Environment) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(text, FileFormat::Toml));
        Self::finish(builder.add_source(environment))
    }

    fn finish(
        builder: config_crate::ConfigBuilder<config_crate::builder::DefaultState>,
    ) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;
        let mut fleet: FleetConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        fleet.expand_paths()?;
        fleet.validate()?;
        debug!(identity = %fleet.connector.identity, "Configuration loaded");
        Ok(fleet)
    }

    /// Expand `~` and environment variables in TLS paths
    pub fn expand_paths(&mut self) -> Result<()> {
        if let Some(tls) = self.tls.as_mut() {
            tls.ca = expand_path(&tls.ca).context("Failed to expand TLS CA path")?;
            tls.cert = expand_path(&tls.cert).context("Failed to expand TLS cert path")?;
            tls.key = expand_path(&tls.key).context("Failed to expand TLS key path")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let connector = &self.connector;
        if connector.identity.trim().is_empty() {
            bail!("connector.identity must not be empty");
        }
        if connector.networks.is_empty() {
            bail!("connector.networks must list at least one network");
        }
        if connector.servers.is_empty() {
            bail!("connector.servers must list at least one server");
        }

        if let Some(broker) = &self.broker {
            if broker.cluster.trim().is_empty() {
                bail!("broker.cluster must not be empty");
            }
            if broker.collective.servers.is_empty() {
                bail!("broker.collective.servers must list at least one server");
            }
            if broker.federation.servers.is_empty() {
                bail!("broker.federation.servers must list at least one server");
            }
            if broker.queue_capacity == 0 {
                bail!("broker.queue_capacity must be greater than zero");
            }
        }
        Ok(())
    }

    /// Broker section, required by the broker binary
    pub fn broker(&self) -> Result<&BrokerConfig> {
        self.broker
            .as_ref()
            .context("Configuration has no [broker] section")
    }
}

impl ConnectorConfig {
    pub fn main_network(&self) -> &str {
        self.networks.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_federated(&self) -> bool {
        !self.federations.is_empty()
    }

    pub fn reconnect_wait(&self) -> Duration {
        Duration::from_millis(self.reconnect_wait_ms)
    }
}

impl BrokerConfig {
    pub fn instance_name(&self) -> &str {
        self.instance.as_deref().unwrap_or(&self.cluster)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path {}", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
