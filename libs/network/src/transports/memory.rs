//! # In-Process Bus
//!
//! [`MemoryCluster`] is a bus cluster living in process memory;
//! [`MemoryTransport`] is one client connection to it. Delivery follows the
//! usual subject rules:
//!
//! - exact subjects, `*` for one token and `>` for the remaining tokens
//! - plain subscribers each get a copy
//! - a queue group gets one copy, handed to its members round-robin
//!
//! A cluster can be taken offline with [`MemoryCluster::set_online`]; its
//! clients move to `Reconnecting` and come back after the fixed reconnect
//! backoff once it is online again, keeping their subscriptions.

use super::{ConnectOptions, ConnectionState, Frame, StatsTracker, Transport, TransportStats};
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct MemorySubscription {
    client: u64,
    subject: String,
    queue_group: Option<String>,
    sender: mpsc::UnboundedSender<Frame>,
}

pub struct MemoryCluster {
    name: String,
    online: watch::Sender<bool>,
    subscriptions: RwLock<Vec<MemorySubscription>>,
    next_client: AtomicU64,
    round_robin: AtomicU64,
}

impl MemoryCluster {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (online, _) = watch::channel(true);
        Arc::new(Self {
            name: name.into(),
            online,
            subscriptions: RwLock::new(Vec::new()),
            next_client: AtomicU64::new(1),
            round_robin: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server address clients report once connected
    pub fn url(&self) -> String {
        format!("memory://{}", self.name)
    }

    /// New client connection to this cluster
    pub fn transport(self: &Arc<Self>) -> MemoryTransport {
        MemoryTransport::new(Arc::clone(self))
    }

    pub fn set_online(&self, online: bool) {
        info!(cluster = %self.name, online, "Cluster availability changed");
        self.online.send_replace(online);
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    fn watch_online(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    fn register(&self, subscription: MemorySubscription) {
        self.subscriptions.write().push(subscription);
    }

    fn unregister_client(&self, client: u64) {
        self.subscriptions.write().retain(|s| s.client != client);
    }

    /// Hand `frame` to every matching subscriber; returns copies delivered
    fn deliver(&self, frame: Frame) -> Result<usize> {
        if !self.is_online() {
            return Err(TransportError::connection(
                "cluster offline",
                Some(&self.url()),
            ));
        }

        let subscriptions = self.subscriptions.read();
        let mut delivered = 0;
        let mut groups: HashMap<&str, Vec<&MemorySubscription>> = HashMap::new();

        for sub in subscriptions
            .iter()
            .filter(|s| subject_matches(&s.subject, &frame.subject))
        {
            match sub.queue_group.as_deref() {
                Some(group) => groups.entry(group).or_default().push(sub),
                None => {
                    if sub.sender.send(frame.clone()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        for members in groups.values() {
            let start = self.round_robin.fetch_add(1, Ordering::Relaxed) as usize;
            // first member still listening, starting at the rotation offset
            for i in 0..members.len() {
                let member = members[(start + i) % members.len()];
                if member.sender.send(frame.clone()).is_ok() {
                    delivered += 1;
                    break;
                }
            }
        }

        debug!(
            cluster = %self.name,
            subject = %frame.subject,
            delivered,
            "Frame delivered"
        );
        Ok(delivered)
    }
}

/// Subject match with `*` (one token) and `>` (one or more trailing tokens)
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// One client connection to a [`MemoryCluster`]
pub struct MemoryTransport {
    cluster: Arc<MemoryCluster>,
    client: u64,
    state: Arc<Mutex<ConnectionState>>,
    server: Mutex<Option<String>>,
    stats: Arc<StatsTracker>,
    sender: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryTransport {
    pub fn new(cluster: Arc<MemoryCluster>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = cluster.next_client.fetch_add(1, Ordering::Relaxed);
        Self {
            cluster,
            client,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            server: Mutex::new(None),
            stats: Arc::new(StatsTracker::default()),
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            watchdog: Mutex::new(None),
        }
    }

    pub fn cluster(&self) -> &Arc<MemoryCluster> {
        &self.cluster
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Follow cluster availability for the lifetime of the connection
    fn spawn_watchdog(&self, options: &ConnectOptions) -> JoinHandle<()> {
        let mut online = self.cluster.watch_online();
        let state = Arc::clone(&self.state);
        let stats = Arc::clone(&self.stats);
        let wait = options.reconnect_wait;
        let cluster = self.cluster.name().to_string();

        tokio::spawn(async move {
            loop {
                if online.changed().await.is_err() {
                    break;
                }
                let is_online = *online.borrow_and_update();

                if !is_online {
                    *state.lock() = ConnectionState::Reconnecting;
                    warn!(cluster = %cluster, "Connection lost, reconnecting every {:?}", wait);
                    continue;
                }

                tokio::time::sleep(wait).await;
                let still_online = *online.borrow();
                if !still_online {
                    continue;
                }

                let mut guard = state.lock();
                if *guard == ConnectionState::Reconnecting {
                    *guard = ConnectionState::Connected;
                    stats.record_reconnect();
                    info!(cluster = %cluster, "Reconnected");
                }
            }
        })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start(&self, options: ConnectOptions) -> Result<()> {
        match self.state() {
            ConnectionState::Closed => return Err(TransportError::Closed),
            state if state.is_started() => return Ok(()),
            _ => {}
        }

        self.set_state(ConnectionState::Connecting);
        let online = self.cluster.watch_online();
        loop {
            let is_online = *online.borrow();
            if is_online {
                break;
            }
            warn!(
                cluster = %self.cluster.name(),
                "Cluster unavailable, retrying in {:?}",
                options.reconnect_wait
            );
            tokio::time::sleep(options.reconnect_wait).await;
        }

        let url = self.cluster.url();
        let server = options
            .servers
            .iter()
            .find(|s| **s == url)
            .cloned()
            .unwrap_or(url);

        *self.server.lock() = Some(server.clone());
        self.set_state(ConnectionState::Connected);
        *self.watchdog.lock() = Some(self.spawn_watchdog(&options));

        info!(name = %options.name, server = %server, "Connected to memory cluster");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.set_state(ConnectionState::Closed);
        if let Some(handle) = self.watchdog.lock().take() {
            handle.abort();
        }
        self.cluster.unregister_client(self.client);
        self.sender.lock().take();
        *self.server.lock() = None;
        Ok(())
    }

    async fn publish(&self, subject: &str, data: Bytes, reply_to: Option<&str>) -> Result<()> {
        if !self.state().is_active() {
            return Err(TransportError::not_connected(format!("publish to {}", subject)));
        }

        let size = data.len();
        let frame = Frame {
            subject: subject.to_string(),
            reply_to: reply_to.map(str::to_string),
            data,
        };
        self.cluster.deliver(frame)?;
        self.stats.record_out(size);
        Ok(())
    }

    async fn subscribe(&self, subject: &str, queue_group: Option<&str>) -> Result<()> {
        let state = self.state();
        if state == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }
        if !state.is_started() {
            return Err(TransportError::not_connected(format!("subscribe to {}", subject)));
        }

        let sender = self.sender.lock().clone().ok_or(TransportError::Closed)?;
        self.cluster.register(MemorySubscription {
            client: self.client,
            subject: subject.to_string(),
            queue_group: queue_group.map(str::to_string),
            sender,
        });

        debug!(subject, queue_group, "Subscribed");
        Ok(())
    }

    async fn receive(&self) -> Result<Frame> {
        let mut receiver = self.receiver.lock().await;
        match receiver.recv().await {
            Some(frame) => {
                self.stats.record_in(frame.data.len());
                Ok(frame)
            }
            None => Err(TransportError::Closed),
        }
    }

    fn connected_server(&self) -> Option<String> {
        self.server.lock().clone()
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.watchdog.get_mut().take() {
            handle.abort();
        }
        self.cluster.unregister_client(self.client);
    }
}
