//! Pipeline Metrics
//!
//! Counters updated by the behaviors. Every counter is an atomic, so
//! recording never blocks a request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::error::ErrorKind;

// == Handler Stats ==
#[derive(Debug, Clone, Default, Serialize)]
pub struct HandlerStats {
    pub calls: u64,
    pub failures: u64,
    pub total_ms: u64,
}

// == Pipeline Metrics ==
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    requests: AtomicU64,
    succeeded: AtomicU64,
    validation_failures: AtomicU64,
    not_found: AtomicU64,
    conflicts: AtomicU64,
    unauthorized: AtomicU64,
    cancelled: AtomicU64,
    unexpected: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_writes: AtomicU64,
    compressed_writes: AtomicU64,
    cache_errors: AtomicU64,
    invalidations: AtomicU64,
    invalidation_failures: AtomicU64,
    handlers: Mutex<HashMap<&'static str, HandlerStats>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // == Outcomes ==
    /// Records the final outcome of a request for `handler`.
    pub fn record_outcome(&self, handler: &'static str, failure: Option<ErrorKind>, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match failure {
            None => &self.succeeded,
            Some(ErrorKind::Validation) => &self.validation_failures,
            Some(ErrorKind::NotFound) => &self.not_found,
            Some(ErrorKind::Conflict) => &self.conflicts,
            Some(ErrorKind::Unauthorized) => &self.unauthorized,
            Some(ErrorKind::Cancelled) => &self.cancelled,
            Some(ErrorKind::Unexpected) => &self.unexpected,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let stats = handlers.entry(handler).or_default();
        stats.calls += 1;
        stats.total_ms += elapsed.as_millis() as u64;
        if failure.is_some() {
            stats.failures += 1;
        }
    }

    // == Cache ==
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_write(&self, compressed: bool) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
        if compressed {
            self.compressed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A read-path cache failure that was downgraded to a miss or a skipped write.
    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self, failures: u64) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.invalidation_failures
            .fetch_add(failures, Ordering::Relaxed);
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> MetricsSnapshot {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, stats)| (name.to_string(), stats.clone()))
            .collect();

        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            unexpected: self.unexpected.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            compressed_writes: self.compressed_writes.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            invalidation_failures: self.invalidation_failures.load(Ordering::Relaxed),
            handlers,
        }
    }
}

// == Metrics Snapshot ==
/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub succeeded: u64,
    pub validation_failures: u64,
    pub not_found: u64,
    pub conflicts: u64,
    pub unauthorized: u64,
    pub cancelled: u64,
    pub unexpected: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_writes: u64,
    pub compressed_writes: u64,
    pub cache_errors: u64,
    pub invalidations: u64,
    pub invalidation_failures: u64,
    pub handlers: HashMap<String, HandlerStats>,
}

impl MetricsSnapshot {
    /// hits / (hits + misses), or 0.0 before any cacheable read.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
