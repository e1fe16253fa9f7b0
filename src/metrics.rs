//! Pipeline Metrics
//!
//! Per-operation counters ([`OperationStats`]) plus process-wide Prometheus
//! counters aggregated across every operation, labelled by operation kind.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};

// =============================================================================
// Per-Operation Stats
// =============================================================================

/// Progress and residency counters for one operation.
#[derive(Debug, Default)]
pub struct OperationStats {
    stripes_processed: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    resident_stripes: AtomicUsize,
    peak_resident_stripes: AtomicUsize,
}

impl OperationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stripe(&self) {
        self.stripes_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_write(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// A stripe's buffers were allocated.
    pub fn stripe_allocated(&self) {
        let now = self.resident_stripes.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_resident_stripes.fetch_max(now, Ordering::SeqCst);
    }

    /// A stripe's buffers were released.
    pub fn stripe_released(&self) {
        self.resident_stripes.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn stripes_processed(&self) -> u64 {
        self.stripes_processed.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn resident_stripes(&self) -> usize {
        self.resident_stripes.load(Ordering::SeqCst)
    }

    pub fn peak_resident_stripes(&self) -> usize {
        self.peak_resident_stripes.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Process-Wide Counters
// =============================================================================

/// Prometheus counters shared by every operation in the process.
pub struct PipelineMetrics {
    registry: Registry,
    stripes: IntCounterVec,
    bytes_read: IntCounterVec,
    bytes_written: IntCounterVec,
    outcomes: IntCounterVec,
}

static METRICS: Lazy<PipelineMetrics> = Lazy::new(PipelineMetrics::new);

/// Process-wide metrics instance
pub fn global() -> &'static PipelineMetrics {
    &METRICS
}

fn counter(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    // names and labels are compile-time constants
    IntCounterVec::new(Opts::new(name, help), labels).expect("valid metric definition")
}

impl PipelineMetrics {
    fn new() -> Self {
        let registry = Registry::new();
        let stripes = counter(
            "stripeflow_stripes_total",
            "Stripes passed through the coding primitive",
            &["operation"],
        );
        let bytes_read = counter(
            "stripeflow_bytes_read_total",
            "Bytes read from input lanes",
            &["operation"],
        );
        let bytes_written = counter(
            "stripeflow_bytes_written_total",
            "Bytes written to output lanes",
            &["operation"],
        );
        let outcomes = counter(
            "stripeflow_operations_total",
            "Finished operations by outcome",
            &["operation", "outcome"],
        );

        for c in [&stripes, &bytes_read, &bytes_written, &outcomes] {
            // a fresh registry cannot hold duplicates
            let _ = registry.register(Box::new(c.clone()));
        }

        Self {
            registry,
            stripes,
            bytes_read,
            bytes_written,
            outcomes,
        }
    }

    pub fn record_stripe(&self, operation: &str) {
        self.stripes.with_label_values(&[operation]).inc();
    }

    pub fn record_read(&self, operation: &str, bytes: usize) {
        self.bytes_read
            .with_label_values(&[operation])
            .inc_by(bytes as u64);
    }

    pub fn record_write(&self, operation: &str, bytes: usize) {
        self.bytes_written
            .with_label_values(&[operation])
            .inc_by(bytes as u64);
    }

    /// `outcome` is `"ok"` or an error kind label.
    pub fn record_outcome(&self, operation: &str, outcome: &str) {
        self.outcomes.with_label_values(&[operation, outcome]).inc();
    }

    pub fn stripes(&self, operation: &str) -> u64 {
        self.stripes.with_label_values(&[operation]).get()
    }

    pub fn outcomes(&self, operation: &str, outcome: &str) -> u64 {
        self.outcomes.with_label_values(&[operation, outcome]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Render every pipeline counter in the Prometheus text format.
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&global().registry.gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics not UTF-8: {}", e)))
}
