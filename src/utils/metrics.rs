//! Observability and Metrics
//!
//! This module provides metrics collection for the decode → invoke → encode
//! pipeline and the policy cache.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for pipeline operations
#[derive(Debug)]
pub struct Metrics {
    /// Total calls handed to a dispatcher
    pub requests_total: AtomicU64,
    /// Requests decoded into a method invocation
    pub requests_decoded: AtomicU64,
    /// Invocations that returned normally and were encoded
    pub requests_succeeded: AtomicU64,
    /// Invocations that threw a declared exception
    pub declared_failures: AtomicU64,
    /// Requests answered with an incompatibility failure
    pub incompatible_requests: AtomicU64,
    /// Requests refused by the security gate
    pub blocked_access: AtomicU64,
    /// Invocations that threw an undeclared exception
    pub unexpected_failures: AtomicU64,
    /// Policy files loaded
    pub policy_loads: AtomicU64,
    /// Policy files missing or malformed
    pub policy_load_failures: AtomicU64,
    /// Policy cache hits
    pub policy_cache_hits: AtomicU64,
    /// Policy cache misses
    pub policy_cache_misses: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_decoded: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            declared_failures: AtomicU64::new(0),
            incompatible_requests: AtomicU64::new(0),
            blocked_access: AtomicU64::new(0),
            unexpected_failures: AtomicU64::new(0),
            policy_loads: AtomicU64::new(0),
            policy_load_failures: AtomicU64::new(0),
            policy_cache_hits: AtomicU64::new(0),
            policy_cache_misses: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an incoming call
    pub fn request_received(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully decoded request
    pub fn request_decoded(&self) {
        self.requests_decoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a normal return
    pub fn request_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a declared exception
    pub fn declared_failure(&self) {
        self.declared_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an incompatible request
    pub fn incompatible_request(&self) {
        self.incompatible_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a gate rejection
    pub fn access_blocked(&self) {
        self.blocked_access.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an undeclared exception
    pub fn unexpected_failure(&self) {
        self.unexpected_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a policy file load
    pub fn policy_loaded(&self) {
        self.policy_loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a policy file that could not be loaded
    pub fn policy_load_failed(&self) {
        self.policy_load_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a policy cache hit
    pub fn policy_cache_hit(&self) {
        self.policy_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a policy cache miss
    pub fn policy_cache_miss(&self) {
        self.policy_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_decoded: self.requests_decoded.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            declared_failures: self.declared_failures.load(Ordering::Relaxed),
            incompatible_requests: self.incompatible_requests.load(Ordering::Relaxed),
            blocked_access: self.blocked_access.load(Ordering::Relaxed),
            unexpected_failures: self.unexpected_failures.load(Ordering::Relaxed),
            policy_loads: self.policy_loads.load(Ordering::Relaxed),
            policy_load_failures: self.policy_load_failures.load(Ordering::Relaxed),
            policy_cache_hits: self.policy_cache_hits.load(Ordering::Relaxed),
            policy_cache_misses: self.policy_cache_misses.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            requests_total = snapshot.requests_total,
            requests_decoded = snapshot.requests_decoded,
            requests_succeeded = snapshot.requests_succeeded,
            declared_failures = snapshot.declared_failures,
            incompatible_requests = snapshot.incompatible_requests,
            blocked_access = snapshot.blocked_access,
            unexpected_failures = snapshot.unexpected_failures,
            policy_loads = snapshot.policy_loads,
            policy_load_failures = snapshot.policy_load_failures,
            policy_cache_hits = snapshot.policy_cache_hits,
            policy_cache_misses = snapshot.policy_cache_misses,
            uptime_seconds = snapshot.uptime_seconds,
            "RPC metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_decoded: u64,
    pub requests_succeeded: u64,
    pub declared_failures: u64,
    pub incompatible_requests: u64,
    pub blocked_access: u64,
    pub unexpected_failures: u64,
    pub policy_loads: u64,
    pub policy_load_failures: u64,
    pub policy_cache_hits: u64,
    pub policy_cache_misses: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Initialize metrics collection (call once at startup)
pub fn init_metrics() {
    let _ = global_metrics();
    info!("Metrics collection initialized");
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.request_received();
        metrics.request_received();
        metrics.access_blocked();
        metrics.policy_cache_miss();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.blocked_access, 1);
        assert_eq!(snapshot.policy_cache_misses, 1);
        assert_eq!(snapshot.policy_cache_hits, 0);
    }
}
