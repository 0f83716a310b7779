//! # Processor Runtime
//!
//! One processor owns one bus connection and runs two tasks on it:
//!
//! ```text
//!            ┌──────────── this processor's connection ────────────┐
//!  ingress ─►│ consumer ─► check/process ─► peer outbox             │
//!            │                                                      │
//!  own outbox ─► dispatcher ─► publish to every target              │
//!            └──────────────────────────────────────────────────────┘
//! ```
//!
//! The consumer feeds the *peer* processor's outbox, since accepted messages
//! leave through the other bus. Outboxes are bounded channels and are the
//! only state the two tasks share.
//!
//! States: `created → connecting → connected → draining → stopped`, with
//! `reconnecting` while the transport is re-establishing its connection.

use crate::logic::{log_rejection, parse_message};
use crate::stats::ProcessorCounters;
use crate::{BrokerError, ProcessorLogic, Result, WorkItem};
use health_check::ProcessorSnapshot;
use network::{ConnectOptions, ConnectionState, Transport};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Created,
    Connecting,
    Connected,
    Reconnecting,
    Draining,
    Stopped,
}

impl ProcessorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sending half of a processor's outbox. Items are counted from the moment
/// a send begins until the dispatcher takes them off the queue.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<WorkItem>,
    depth: Arc<AtomicUsize>,
}

impl Outbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WorkItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let outbox = Self {
            tx,
            depth: Arc::new(AtomicUsize::new(0)),
        };
        (outbox, rx)
    }

    pub async fn send(&self, item: WorkItem) -> std::result::Result<(), SendError<WorkItem>> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let result = self.tx.send(item).await;
        if result.is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Handles of the two tasks a started processor runs
pub struct ProcessorTasks {
    pub consumer: JoinHandle<()>,
    pub dispatcher: JoinHandle<()>,
}

pub struct Processor {
    logic: Arc<dyn ProcessorLogic>,
    transport: Arc<dyn Transport>,
    options: ConnectOptions,
    state: RwLock<ProcessorState>,
    counters: Arc<ProcessorCounters>,
    outbox: Mutex<Option<Outbox>>,
    outbox_rx: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    depth: Arc<AtomicUsize>,
}

impl Processor {
    pub fn new(
        logic: Arc<dyn ProcessorLogic>,
        transport: Arc<dyn Transport>,
        options: ConnectOptions,
        capacity: usize,
    ) -> Self {
        let (outbox, rx) = Outbox::channel(capacity);
        let depth = Arc::clone(&outbox.depth);
        Self {
            logic,
            transport,
            options,
            state: RwLock::new(ProcessorState::Created),
            counters: Arc::new(ProcessorCounters::default()),
            outbox: Mutex::new(Some(outbox)),
            outbox_rx: Mutex::new(Some(rx)),
            depth,
        }
    }

    pub fn name(&self) -> &'static str {
        self.logic.name()
    }

    pub fn logic(&self) -> &Arc<dyn ProcessorLogic> {
        &self.logic
    }

    /// Sender for this processor's outbox; `None` once draining
    pub fn outbox(&self) -> Option<Outbox> {
        self.outbox.lock().clone()
    }

    pub fn state(&self) -> ProcessorState {
        let state = *self.state.read();
        if state == ProcessorState::Connected
            && self.transport.state() == ConnectionState::Reconnecting
        {
            ProcessorState::Reconnecting
        } else {
            state
        }
    }

    fn set_state(&self, state: ProcessorState) {
        debug!(processor = self.name(), state = %state, "Processor state change");
        *self.state.write() = state;
    }

    /// Items waiting in the outbox, including while draining
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProcessorSnapshot {
        self.counters.snapshot(
            self.state().as_str(),
            self.transport.connected_server(),
            self.queue_depth(),
        )
    }

    /// Connect, bind the ingress subject and spawn the consumer and
    /// dispatcher. Accepted messages are pushed into `peer`.
    pub async fn start_connection_and_handlers(
        &self,
        peer: Outbox,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ProcessorTasks> {
        let outbox_rx = self
            .outbox_rx
            .lock()
            .take()
            .ok_or_else(|| BrokerError::AlreadyStarted(self.name().to_string()))?;

        self.set_state(ProcessorState::Connecting);
        info!(
            processor = self.name(),
            servers = ?self.options.servers,
            "Connecting processor"
        );
        self.transport.start(self.options.clone()).await?;

        let subject = self.logic.subject();
        let queue_group = self.logic.queue_group();
        self.transport
            .subscribe(&subject, Some(&queue_group))
            .await?;
        self.set_state(ProcessorState::Connected);
        info!(
            processor = self.name(),
            subject = %subject,
            queue_group = %queue_group,
            server = ?self.transport.connected_server(),
            "Processor connected"
        );

        let consumer = tokio::spawn(consume(
            Arc::clone(&self.logic),
            Arc::clone(&self.transport),
            Arc::clone(&self.counters),
            peer,
            shutdown,
        ));
        let dispatcher = tokio::spawn(dispatch(
            self.name(),
            Arc::clone(&self.transport),
            Arc::clone(&self.counters),
            outbox_rx,
            Arc::clone(&self.depth),
        ));

        Ok(ProcessorTasks {
            consumer,
            dispatcher,
        })
    }

    /// Stop accepting work into this processor's outbox
    pub fn begin_draining(&self) {
        self.set_state(ProcessorState::Draining);
        self.outbox.lock().take();
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.stop().await?;
        self.set_state(ProcessorState::Stopped);
        Ok(())
    }
}

async fn consume(
    logic: Arc<dyn ProcessorLogic>,
    transport: Arc<dyn Transport>,
    counters: Arc<ProcessorCounters>,
    peer: Outbox,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = logic.name();
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = transport.receive() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) if e.is_closed() => break,
            Err(e) => {
                warn!(processor = name, error = %e, "Receive failed");
                continue;
            }
        };
        counters.record_received();

        let message = match parse_message(&frame.data) {
            Ok(message) => message,
            Err(rejection) => {
                log_rejection(name, &rejection);
                counters.record_rejected(&rejection);
                continue;
            }
        };

        if let Err(rejection) = logic.check(&message) {
            log_rejection(name, &rejection);
            counters.record_rejected(&rejection);
            continue;
        }

        let item = match logic.process(message) {
            Ok(item) => item,
            Err(e) => {
                error!(processor = name, error = %e, "Failed to rewrite accepted message");
                counters.record_process_error();
                continue;
            }
        };

        counters.record_accepted();
        debug!(processor = name, req = %item.req, targets = item.targets.len(), "Queued");
        if peer.send(item).await.is_err() {
            warn!(processor = name, "Peer outbox closed");
            break;
        }
    }
    info!(processor = name, "Consumer stopped");
}

async fn dispatch(
    name: &'static str,
    transport: Arc<dyn Transport>,
    counters: Arc<ProcessorCounters>,
    mut outbox: mpsc::Receiver<WorkItem>,
    depth: Arc<AtomicUsize>,
) {
    while let Some(item) = outbox.recv().await {
        depth.fetch_sub(1, Ordering::SeqCst);
        for target in &item.targets {
            match transport.publish(target, item.data.clone(), None).await {
                Ok(()) => counters.record_sent(),
                Err(e) => {
                    counters.record_publish_error();
                    warn!(
                        processor = name,
                        target = %target,
                        req = %item.req,
                        error = %e,
                        "Publish failed"
                    );
                }
            }
        }
    }
    info!(processor = name, "Dispatcher drained");
}
