//! Unified Transport Layer
//!
//! The bus client contract every connector and broker processor talks to,
//! plus two implementations: an in-process [`MemoryCluster`] bus and a plain
//! NATS wire client.
//!
//! Reconnect is owned here, not by callers: once started, a transport retries
//! forever with a fixed backoff and callers only observe transient
//! `NotConnected` errors and the `Reconnecting` state.

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub mod memory;
pub mod nats;

pub use memory::{MemoryCluster, MemoryTransport};
pub use nats::NatsTransport;

/// Default fixed backoff between reconnect attempts
pub const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(1);

/// Bus client contract
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to one of `options.servers`, retrying until one answers
    async fn start(&self, options: ConnectOptions) -> Result<()>;

    /// Close the connection; pending `receive` calls end with `Closed`
    async fn stop(&self) -> Result<()>;

    async fn publish(&self, subject: &str, data: Bytes, reply_to: Option<&str>) -> Result<()>;

    async fn subscribe(&self, subject: &str, queue_group: Option<&str>) -> Result<()>;

    /// Next frame from any subscription; blocks until one arrives
    async fn receive(&self) -> Result<Frame>;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn connected_server(&self) -> Option<String>;

    fn state(&self) -> ConnectionState;

    fn stats(&self) -> TransportStats;
}

/// One message as delivered by the bus
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub subject: String,
    pub reply_to: Option<String>,
    pub data: Bytes,
}

impl Frame {
    pub fn new(subject: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply_to: None,
            data: data.into(),
        }
    }
}

/// TLS material handed over by the external provisioning layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsContext {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub name: String,
    pub servers: Vec<String>,
    pub tls: Option<TlsContext>,
    pub reconnect_wait: Duration,
}

impl ConnectOptions {
    pub fn new(name: impl Into<String>, servers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            servers,
            tls: None,
            reconnect_wait: DEFAULT_RECONNECT_WAIT,
        }
    }

    pub fn with_tls(mut self, tls: Option<TlsContext>) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl ConnectionState {
    /// Check if connection is active
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Started and not yet stopped
    pub fn is_started(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }
}

/// Counters reported by a transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    pub in_msgs: u64,
    pub out_msgs: u64,
    pub in_bytes: u64,
    pub out_bytes: u64,
    pub reconnects: u64,
}

/// Lock-free counters backing [`TransportStats`]
#[derive(Debug, Default)]
pub struct StatsTracker {
    in_msgs: AtomicU64,
    out_msgs: AtomicU64,
    in_bytes: AtomicU64,
    out_bytes: AtomicU64,
    reconnects: AtomicU64,
}

impl StatsTracker {
    pub fn record_in(&self, bytes: usize) {
        self.in_msgs.fetch_add(1, Ordering::Relaxed);
        self.in_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_out(&self, bytes: usize) {
        self.out_msgs.fetch_add(1, Ordering::Relaxed);
        self.out_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportStats {
        TransportStats {
            in_msgs: self.in_msgs.load(Ordering::Relaxed),
            out_msgs: self.out_msgs.load(Ordering::Relaxed),
            in_bytes: self.in_bytes.load(Ordering::Relaxed),
            out_bytes: self.out_bytes.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}
