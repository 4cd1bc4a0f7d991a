//! Routing counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use relay_core::types::RouteSource;
use serde::{Deserialize, Serialize};

/// Monotonic counters shared by the router and the batch scheduler.
pub struct RoutingMetrics {
    total_requests: AtomicU64,
    locally_processed: AtomicU64,
    cached_requests: AtomicU64,
    batched_requests: AtomicU64,
    api_calls_saved: AtomicU64,
    remote_calls: AtomicU64,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Plain copy of the routing counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingCounters {
    pub total_requests: u64,
    pub locally_processed: u64,
    pub cached_requests: u64,
    pub batched_requests: u64,
    pub api_calls_saved: u64,
    pub remote_calls: u64,
}

impl Default for RoutingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            locally_processed: AtomicU64::new(0),
            cached_requests: AtomicU64::new(0),
            batched_requests: AtomicU64::new(0),
            api_calls_saved: AtomicU64::new(0),
            remote_calls: AtomicU64::new(0),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Count a task entering the router.
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a resolved task by source.
    ///
    /// Batch resolutions are credited by the scheduler at flush time, so
    /// only local and cache outcomes add to `api_calls_saved` here.
    pub fn record_resolution(&self, source: RouteSource) {
        match source {
            RouteSource::Local => {
                self.locally_processed.fetch_add(1, Ordering::Relaxed);
                self.api_calls_saved.fetch_add(1, Ordering::Relaxed);
            }
            RouteSource::Cache => {
                self.cached_requests.fetch_add(1, Ordering::Relaxed);
                self.api_calls_saved.fetch_add(1, Ordering::Relaxed);
            }
            RouteSource::Batch | RouteSource::Remote => {}
        }
    }

    /// Count one flushed batch group of `size` items.
    pub fn record_batch_flush(&self, size: usize, calls_saved: u64) {
        self.batched_requests
            .fetch_add(size as u64, Ordering::Relaxed);
        self.api_calls_saved.fetch_add(calls_saved, Ordering::Relaxed);
    }

    /// Count one call actually made to the remote collaborator.
    pub fn record_remote_call(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> RoutingCounters {
        RoutingCounters {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            locally_processed: self.locally_processed.load(Ordering::Relaxed),
            cached_requests: self.cached_requests.load(Ordering::Relaxed),
            batched_requests: self.batched_requests.load(Ordering::Relaxed),
            api_calls_saved: self.api_calls_saved.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn runtime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl RoutingCounters {
    /// Share of routed tasks that avoided a dedicated remote call, in percent.
    pub fn savings_percentage(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.api_calls_saved as f64 / self.total_requests as f64 * 100.0
        }
    }
}
