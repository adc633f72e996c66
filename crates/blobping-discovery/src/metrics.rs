//! Discovery metrics for Prometheus
//!
//! Tracks protocol operations, latencies, discovered records and reaped
//! blobs.

use std::fmt::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Discovery operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryOperation {
    ReadAll,
    Write,
    Remove,
    RemoveAll,
    ReaperCycle,
}

impl DiscoveryOperation {
    pub const ALL: [Self; 5] = [
        Self::ReadAll,
        Self::Write,
        Self::Remove,
        Self::RemoveAll,
        Self::ReaperCycle,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReadAll => "ReadAll",
            Self::Write => "Write",
            Self::Remove => "Remove",
            Self::RemoveAll => "RemoveAll",
            Self::ReaperCycle => "ReaperCycle",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Per-operation metrics
#[derive(Debug, Default)]
struct OperationMetrics {
    /// Total invocations
    requests_total: AtomicU64,
    /// Invocations that returned an error
    requests_failed: AtomicU64,
    /// Latency sum in microseconds
    latency_sum_us: AtomicU64,
}

impl OperationMetrics {
    fn record(&self, success: bool, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
    }
}

/// Discovery metrics collector
#[derive(Debug)]
pub struct DiscoveryMetrics {
    operations: [OperationMetrics; 5],
    /// Records handed to response sinks
    records_discovered: AtomicU64,
    /// Blobs deleted by the reaper
    blobs_reaped: AtomicU64,
    /// Deletes the store refused or failed
    delete_failures: AtomicU64,
    /// Reaper cycles skipped because this member was not coordinator
    reaper_cycles_skipped: AtomicU64,
    start_time: Instant,
}

impl Default for DiscoveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryMetrics {
    /// Create a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: Default::default(),
            records_discovered: AtomicU64::new(0),
            blobs_reaped: AtomicU64::new(0),
            delete_failures: AtomicU64::new(0),
            reaper_cycles_skipped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one operation
    pub fn record_operation(&self, op: DiscoveryOperation, success: bool, latency_us: u64) {
        self.operations[op.index()].record(success, latency_us);
    }

    pub fn record_discovered(&self, count: u64) {
        self.records_discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_reaped(&self, count: u64) {
        self.blobs_reaped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_delete_failures(&self, count: u64) {
        self.delete_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_reaper_skip(&self) {
        self.reaper_cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn requests(&self, op: DiscoveryOperation) -> u64 {
        self.operations[op.index()]
            .requests_total
            .load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self, op: DiscoveryOperation) -> u64 {
        self.operations[op.index()]
            .requests_failed
            .load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn records_discovered(&self) -> u64 {
        self.records_discovered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn blobs_reaped(&self) -> u64 {
        self.blobs_reaped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn delete_failures(&self) -> u64 {
        self.delete_failures.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus text format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(2 * 1024);

        let _ = writeln!(
            output,
            "# HELP blobping_uptime_seconds Time since the metrics collector started"
        );
        let _ = writeln!(output, "# TYPE blobping_uptime_seconds counter");
        let _ = writeln!(
            output,
            "blobping_uptime_seconds {}",
            self.start_time.elapsed().as_secs()
        );

        let _ = writeln!(
            output,
            "# HELP blobping_operations_total Discovery operations by type"
        );
        let _ = writeln!(output, "# TYPE blobping_operations_total counter");
        for op in DiscoveryOperation::ALL {
            let _ = writeln!(
                output,
                "blobping_operations_total{{operation=\"{}\"}} {}",
                op.as_str(),
                self.requests(op)
            );
        }

        let _ = writeln!(
            output,
            "# HELP blobping_operation_failures_total Discovery operations that returned an error"
        );
        let _ = writeln!(output, "# TYPE blobping_operation_failures_total counter");
        for op in DiscoveryOperation::ALL {
            let _ = writeln!(
                output,
                "blobping_operation_failures_total{{operation=\"{}\"}} {}",
                op.as_str(),
                self.failures(op)
            );
        }

        let _ = writeln!(
            output,
            "# HELP blobping_operation_duration_seconds_sum Total time spent per operation"
        );
        let _ = writeln!(
            output,
            "# TYPE blobping_operation_duration_seconds_sum counter"
        );
        for op in DiscoveryOperation::ALL {
            let latency_us = self.operations[op.index()]
                .latency_sum_us
                .load(Ordering::Relaxed);
            let _ = writeln!(
                output,
                "blobping_operation_duration_seconds_sum{{operation=\"{}\"}} {:.6}",
                op.as_str(),
                latency_us as f64 / 1_000_000.0
            );
        }

        for (name, help, value) in [
            (
                "blobping_records_discovered_total",
                "Membership records delivered to response sinks",
                self.records_discovered(),
            ),
            (
                "blobping_blobs_reaped_total",
                "Stale or empty blobs deleted by the reaper",
                self.blobs_reaped(),
            ),
            (
                "blobping_delete_failures_total",
                "Blob deletes that failed",
                self.delete_failures(),
            ),
            (
                "blobping_reaper_cycles_skipped_total",
                "Reaper cycles skipped on non-coordinator members",
                self.reaper_cycles_skipped.load(Ordering::Relaxed),
            ),
        ] {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {value}");
        }

        output
    }
}

static DISCOVERY_METRICS: OnceLock<DiscoveryMetrics> = OnceLock::new();

/// Get the global discovery metrics instance
pub fn discovery_metrics() -> &'static DiscoveryMetrics {
    DISCOVERY_METRICS.get_or_init(DiscoveryMetrics::new)
}

/// Times one operation and records it in the global metrics
pub struct OperationTimer {
    op: DiscoveryOperation,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation
    #[must_use]
    pub fn new(op: DiscoveryOperation) -> Self {
        Self {
            op,
            start: Instant::now(),
        }
    }

    /// Complete the operation
    pub fn complete(self, success: bool) {
        let latency_us = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
        discovery_metrics().record_operation(self.op, success, latency_us);
    }
}
