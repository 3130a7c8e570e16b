//! Observability and Metrics
//!
//! This module provides metrics collection for the decode loop, the handler chain and
//! the packet registry.
//!
//! Uses atomic counters for thread-safe metrics collection. A collector is shared
//! through `Arc` with whichever pipelines and registries should report into it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for engine operations
#[derive(Debug)]
pub struct Metrics {
    /// Bytes consumed by decode loops
    pub bytes_decoded: AtomicU64,
    /// Payloads produced by decode loops
    pub payloads_decoded: AtomicU64,
    /// Decode loops that stopped on a partial object
    pub partial_decodes: AtomicU64,
    /// Decode loops stopped by the zero-progress guard
    pub stalled_decodes: AtomicU64,
    /// Decode attempts that failed with an error
    pub decode_errors: AtomicU64,
    /// Payloads delivered to a stage
    pub payloads_dispatched: AtomicU64,
    /// Payloads that reached the end of a chain unhandled
    pub payloads_dropped: AtomicU64,
    /// Payloads written by composers
    pub payloads_composed: AtomicU64,
    /// Bytes written by composers
    pub bytes_composed: AtomicU64,
    /// Registry table rebuilds
    pub registry_rebuilds: AtomicU64,
    /// Registrations skipped during rebuilds
    pub registrations_rejected: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            bytes_decoded: AtomicU64::new(0),
            payloads_decoded: AtomicU64::new(0),
            partial_decodes: AtomicU64::new(0),
            stalled_decodes: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            payloads_dispatched: AtomicU64::new(0),
            payloads_dropped: AtomicU64::new(0),
            payloads_composed: AtomicU64::new(0),
            bytes_composed: AtomicU64::new(0),
            registry_rebuilds: AtomicU64::new(0),
            registrations_rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record bytes consumed by one complete decode attempt
    pub fn payload_decoded(&self, byte_count: u64) {
        self.payloads_decoded.fetch_add(1, Ordering::Relaxed);
        self.bytes_decoded.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn partial_decode(&self) {
        self.partial_decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stalled_decode(&self) {
        self.stalled_decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payload_dispatched(&self) {
        self.payloads_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payload_dropped(&self) {
        self.payloads_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one composed payload and its encoded size
    pub fn payload_composed(&self, byte_count: u64) {
        self.payloads_composed.fetch_add(1, Ordering::Relaxed);
        self.bytes_composed.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a rebuild and how many registrations it skipped
    pub fn registry_rebuilt(&self, rejected: u64) {
        self.registry_rebuilds.fetch_add(1, Ordering::Relaxed);
        self.registrations_rejected.fetch_add(rejected, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_decoded: self.bytes_decoded.load(Ordering::Relaxed),
            payloads_decoded: self.payloads_decoded.load(Ordering::Relaxed),
            partial_decodes: self.partial_decodes.load(Ordering::Relaxed),
            stalled_decodes: self.stalled_decodes.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            payloads_dispatched: self.payloads_dispatched.load(Ordering::Relaxed),
            payloads_dropped: self.payloads_dropped.load(Ordering::Relaxed),
            payloads_composed: self.payloads_composed.load(Ordering::Relaxed),
            bytes_composed: self.bytes_composed.load(Ordering::Relaxed),
            registry_rebuilds: self.registry_rebuilds.load(Ordering::Relaxed),
            registrations_rejected: self.registrations_rejected.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            bytes_decoded = snapshot.bytes_decoded,
            payloads_decoded = snapshot.payloads_decoded,
            partial_decodes = snapshot.partial_decodes,
            stalled_decodes = snapshot.stalled_decodes,
            decode_errors = snapshot.decode_errors,
            payloads_dispatched = snapshot.payloads_dispatched,
            payloads_dropped = snapshot.payloads_dropped,
            payloads_composed = snapshot.payloads_composed,
            bytes_composed = snapshot.bytes_composed,
            registry_rebuilds = snapshot.registry_rebuilds,
            registrations_rejected = snapshot.registrations_rejected,
            uptime_seconds = snapshot.uptime_seconds,
            "Engine metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_decoded: u64,
    pub payloads_decoded: u64,
    pub partial_decodes: u64,
    pub stalled_decodes: u64,
    pub decode_errors: u64,
    pub payloads_dispatched: u64,
    pub payloads_dropped: u64,
    pub payloads_composed: u64,
    pub bytes_composed: u64,
    pub registry_rebuilds: u64,
    pub registrations_rejected: u64,
    pub uptime_seconds: u64,
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
        metrics.payload_decoded(10);
        metrics.payload_decoded(5);
        metrics.registry_rebuilt(2);
        metrics.payload_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.payloads_decoded, 2);
        assert_eq!(snapshot.bytes_decoded, 15);
        assert_eq!(snapshot.registry_rebuilds, 1);
        assert_eq!(snapshot.registrations_rejected, 2);
        assert_eq!(snapshot.payloads_dropped, 1);
    }
}
