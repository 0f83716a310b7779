//! Broker stats document and the reporter that recomputes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const STATUS_UNKNOWN: &str = "unknown";
pub const STATUS_OK: &str = "OK";
pub const STATUS_ERROR: &str = "ERROR";

/// Live counters of one broker processor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSnapshot {
    pub state: String,
    pub connected_server: Option<String>,
    /// Items waiting in the processor's outbox
    pub queue_depth: usize,
    pub received: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Rejections keyed by reason
    pub rejections: BTreeMap<String, u64>,
    pub sent: u64,
    pub publish_errors: u64,
    pub last_message: Option<DateTime<Utc>>,
}

/// Whatever the reporter is watching
pub trait StatsSource: Send + Sync {
    /// Per-processor stats keyed by processor name
    fn processors(&self) -> BTreeMap<String, ProcessorSnapshot>;

    /// Background task name to liveness
    fn tasks(&self) -> BTreeMap<String, bool>;

    /// Source-specific health predicate
    fn is_healthy(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerStats {
    pub version: String,
    pub start_time: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub cluster: String,
    pub instance: String,
    pub config_file: Option<String>,
    pub status: String,
    pub processors: BTreeMap<String, ProcessorSnapshot>,
    pub threads: BTreeMap<String, bool>,
    /// Requests served by the stats endpoint, this one included
    pub stats_requests: u64,
}

/// Identity of the process being reported on
#[derive(Debug, Clone, PartialEq)]
pub struct ReporterInfo {
    pub version: String,
    pub cluster: String,
    pub instance: String,
    pub config_file: Option<String>,
}

pub struct StatsReporter {
    info: ReporterInfo,
    start_time: DateTime<Utc>,
    requests: AtomicU64,
    source: Arc<dyn StatsSource>,
}

impl StatsReporter {
    pub fn new(info: ReporterInfo, source: Arc<dyn StatsSource>) -> Self {
        Self {
            info,
            start_time: Utc::now(),
            requests: AtomicU64::new(0),
            source,
        }
    }

    /// Document shape before anything has been measured
    pub fn initial_stats(&self) -> BrokerStats {
        BrokerStats {
            version: self.info.version.clone(),
            start_time: self.start_time,
            uptime_seconds: 0,
            cluster: self.info.cluster.clone(),
            instance: self.info.instance.clone(),
            config_file: self.info.config_file.clone(),
            status: STATUS_UNKNOWN.to_string(),
            processors: BTreeMap::new(),
            threads: BTreeMap::new(),
            stats_requests: self.requests.load(Ordering::Relaxed),
        }
    }

    /// Fresh snapshot; nothing is cached between calls
    pub fn update_broker_stats(&self) -> BrokerStats {
        let mut stats = self.initial_stats();
        stats.uptime_seconds = (Utc::now() - self.start_time).num_seconds();
        stats.threads = self.source.tasks();
        stats.processors = self.source.processors();

        let all_alive = stats.threads.values().all(|alive| *alive);
        stats.status = if all_alive && self.source.is_healthy() {
            STATUS_OK.to_string()
        } else {
            STATUS_ERROR.to_string()
        };
        stats
    }

    /// Count a request to the stats endpoint
    pub fn record_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }
}
