//! Process-wide addressing state.
//!
//! One [`ConnectorContext`] is built at startup and shared (behind an `Arc`)
//! by every resolver and connector in the process. It holds the node
//! identity, configured networks and the reply-subject sequence.

use fleetbus_config::ConnectorConfig;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct ConnectorContext {
    identity: String,
    networks: Vec<String>,
    federations: Vec<String>,
    record_seen_by: bool,
    pid: u32,
    reply_sequence: AtomicU64,
}

impl ConnectorContext {
    pub fn new(identity: impl Into<String>, networks: Vec<String>) -> Self {
        Self {
            identity: identity.into(),
            networks,
            federations: Vec::new(),
            record_seen_by: false,
            pid: std::process::id(),
            reply_sequence: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(config.identity.clone(), config.networks.clone())
            .with_federations(config.federations.clone())
            .with_seen_by(config.record_seen_by)
    }

    pub fn with_federations(mut self, federations: Vec<String>) -> Self {
        self.federations = federations;
        self
    }

    /// Start a `seen-by` chain on every outbound request
    pub fn with_seen_by(mut self, record: bool) -> Self {
        self.record_seen_by = record;
        self
    }

    /// Override the process id used in reply subjects
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn networks(&self) -> &[String] {
        &self.networks
    }

    pub fn main_network(&self) -> Option<&str> {
        self.networks.first().map(String::as_str)
    }

    pub fn is_configured(&self, network: &str) -> bool {
        self.networks.iter().any(|n| n == network)
    }

    pub fn federations(&self) -> &[String] {
        &self.federations
    }

    pub fn is_federated(&self) -> bool {
        !self.federations.is_empty()
    }

    pub fn records_seen_by(&self) -> bool {
        self.record_seen_by
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Next reply sequence number; starts at 0 and never repeats
    pub fn next_reply_sequence(&self) -> u64 {
        self.reply_sequence.fetch_add(1, Ordering::Relaxed)
    }
}
