//! # Federation Broker
//!
//! Bridges a collective bus and a federation bus with two processors:
//!
//! ```text
//!   federation bus                               collective bus
//!   ──────────────                               ──────────────
//!   …federation ingress ─► FederationProcessor ─► node subjects
//!   client reply subject ◄─ CollectiveProcessor ◄─ …collective ingress
//! ```
//!
//! Each processor owns its connection. Four tasks run while the broker is
//! up and are kept in a named registry for liveness reporting.

use crate::{
    BrokerError, CollectiveProcessor, FederationProcessor, Processor, ProcessorState,
    ProcessorTasks, Result,
};
use futures::future::join_all;
use health_check::{ProcessorSnapshot, StatsSource};
use network::{ConnectOptions, Transport};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Federation network name this broker serves
    pub cluster: String,
    /// Name recorded in `seen-by`
    pub instance: String,
    /// Outbox capacity per processor
    pub queue_capacity: usize,
    pub collective: ConnectOptions,
    pub federation: ConnectOptions,
}

pub struct FederationBroker {
    settings: BrokerSettings,
    collective: Processor,
    federation: Processor,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

impl FederationBroker {
    pub fn new(
        settings: BrokerSettings,
        collective_transport: Arc<dyn Transport>,
        federation_transport: Arc<dyn Transport>,
    ) -> Self {
        let collective = Processor::new(
            Arc::new(CollectiveProcessor::new(
                settings.cluster.clone(),
                settings.instance.clone(),
            )),
            collective_transport,
            settings.collective.clone(),
            settings.queue_capacity,
        );
        let federation = Processor::new(
            Arc::new(FederationProcessor::new(
                settings.cluster.clone(),
                settings.instance.clone(),
            )),
            federation_transport,
            settings.federation.clone(),
            settings.queue_capacity,
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            settings,
            collective,
            federation,
            tasks: Mutex::new(Vec::new()),
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn collective(&self) -> &Processor {
        &self.collective
    }

    pub fn federation(&self) -> &Processor {
        &self.federation
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Connect both processors and start their tasks
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyStarted("broker".to_string()));
        }

        info!(
            cluster = %self.settings.cluster,
            instance = %self.settings.instance,
            "Starting federation broker"
        );

        if let Err(e) = self.start_processors().await {
            error!(error = %e, "Federation broker failed to start");
            if let Err(teardown) = self.shutdown_processors().await {
                warn!(error = %teardown, "Teardown after failed start incomplete");
            }
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        info!(cluster = %self.settings.cluster, "Federation broker started");
        Ok(())
    }

    async fn start_processors(&self) -> Result<()> {
        // each consumer feeds the outbox of the processor on the other bus
        let to_federation = self.federation.outbox().ok_or(BrokerError::NotRunning)?;
        let to_collective = self.collective.outbox().ok_or(BrokerError::NotRunning)?;

        let tasks = self
            .collective
            .start_connection_and_handlers(to_federation, self.shutdown.subscribe())
            .await?;
        self.register(self.collective.name(), tasks);

        let tasks = self
            .federation
            .start_connection_and_handlers(to_collective, self.shutdown.subscribe())
            .await?;
        self.register(self.federation.name(), tasks);
        Ok(())
    }

    fn register(&self, processor: &str, tasks: ProcessorTasks) {
        let mut registry = self.tasks.lock();
        registry.push((format!("{}_consumer", processor), tasks.consumer));
        registry.push((format!("{}_dispatcher", processor), tasks.dispatcher));
    }

    /// Stop consuming, let both outboxes drain, then disconnect
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!(cluster = %self.settings.cluster, "Stopping federation broker");
        self.shutdown_processors().await?;
        info!(cluster = %self.settings.cluster, "Federation broker stopped");
        Ok(())
    }

    async fn shutdown_processors(&self) -> Result<()> {
        self.collective.begin_draining();
        self.federation.begin_draining();
        self.shutdown.send_replace(true);

        let (names, handles): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *self.tasks.lock()).into_iter().unzip();
        for (name, result) in names.iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                warn!(task = %name, error = %e, "Task ended abnormally");
            }
        }

        let collective = self.collective.close().await;
        let federation = self.federation.close().await;
        collective.and(federation)
    }

    /// Running with both processors connected
    pub fn is_healthy(&self) -> bool {
        self.is_running()
            && self.collective.state() == ProcessorState::Connected
            && self.federation.state() == ProcessorState::Connected
    }
}

impl StatsSource for FederationBroker {
    fn processors(&self) -> BTreeMap<String, ProcessorSnapshot> {
        [&self.collective, &self.federation]
            .into_iter()
            .map(|processor| (processor.name().to_string(), processor.snapshot()))
            .collect()
    }

    fn tasks(&self) -> BTreeMap<String, bool> {
        self.tasks
            .lock()
            .iter()
            .map(|(name, handle)| (name.clone(), !handle.is_finished()))
            .collect()
    }

    fn is_healthy(&self) -> bool {
        FederationBroker::is_healthy(self)
    }
}
