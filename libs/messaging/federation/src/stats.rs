//! Per-processor counters behind [`ProcessorSnapshot`].

use crate::Rejection;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use health_check::ProcessorSnapshot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const PROCESS_ERROR: &str = "process_error";

#[derive(Debug, Default)]
pub struct ProcessorCounters {
    received: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    sent: AtomicU64,
    publish_errors: AtomicU64,
    rejections: DashMap<&'static str, u64>,
    last_message: Mutex<Option<DateTime<Utc>>>,
}

impl ProcessorCounters {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        *self.last_message.lock() = Some(Utc::now());
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, rejection: &Rejection) {
        self.reject(rejection.reason());
    }

    /// Accepted by the checks but could not be rewritten
    pub fn record_process_error(&self) {
        self.reject(PROCESS_ERROR);
    }

    fn reject(&self, reason: &'static str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        *self.rejections.entry(reason).or_insert(0) += 1;
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        state: &str,
        connected_server: Option<String>,
        queue_depth: usize,
    ) -> ProcessorSnapshot {
        ProcessorSnapshot {
            state: state.to_string(),
            connected_server,
            queue_depth,
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            rejections: self
                .rejections
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
            sent: self.sent.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            last_message: *self.last_message.lock(),
        }
    }
}
