//! Metrics collector for the connection registry and job scheduler

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

/// Metrics collector
///
/// Unlabelled series are registered once; labelled series are resolved per call.
pub struct MetricsCollector {
    // Connection pool metrics
    pool_creations_total: Counter,
    pool_evictions_total: Counter,
    active_pools: Gauge,
    connect_duration: Histogram,

    // Cluster metrics
    invalidations_published_total: Counter,
    invalidations_received_total: Counter,

    // Job metrics
    job_fires_total: Counter,
    job_execution_duration: Histogram,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            pool_creations_total: counter!("hub_pool_creations_total"),
            pool_evictions_total: counter!("hub_pool_evictions_total"),
            active_pools: gauge!("hub_active_pools"),
            connect_duration: histogram!("hub_connect_duration_seconds"),
            invalidations_published_total: counter!("hub_invalidations_published_total"),
            invalidations_received_total: counter!("hub_invalidations_received_total"),
            job_fires_total: counter!("hub_job_fires_total"),
            job_execution_duration: histogram!("hub_job_execution_duration_seconds"),
        }
    }

    // Connection pool metrics

    pub fn record_pool_created(&self, connect_seconds: f64) {
        self.pool_creations_total.increment(1);
        self.connect_duration.record(connect_seconds);
    }

    pub fn record_pool_evicted(&self) {
        self.pool_evictions_total.increment(1);
    }

    pub fn update_active_pools(&self, count: usize) {
        self.active_pools.set(count as f64);
    }

    // Cluster metrics

    /// `outcome`: locked / contended / unsupported
    pub fn record_lock_acquisition(&self, outcome: &'static str) {
        counter!("hub_lock_acquisitions_total", "outcome" => outcome).increment(1);
        debug!(outcome = outcome, "Lock acquisition recorded");
    }

    pub fn record_invalidation_published(&self) {
        self.invalidations_published_total.increment(1);
    }

    pub fn record_invalidation_received(&self) {
        self.invalidations_received_total.increment(1);
    }

    // Job metrics

    pub fn record_job_fired(&self) {
        self.job_fires_total.increment(1);
    }

    /// `reason`: queue_full / out_of_window / unknown_type / closed
    pub fn record_dispatch_dropped(&self, reason: &'static str) {
        counter!("hub_job_dispatch_dropped_total", "reason" => reason).increment(1);
    }

    /// `result`: success / failure / timeout / panic
    pub fn record_job_execution(&self, result: &'static str, duration_seconds: f64) {
        counter!("hub_job_executions_total", "result" => result).increment(1);
        self.job_execution_duration.record(duration_seconds);
    }
}
