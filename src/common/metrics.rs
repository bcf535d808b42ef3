//! Protocol metrics
//!
//! Lock-free counters, gauges and a latency histogram for the coordinator
//! protocol, exported in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for round-trip latency (in milliseconds)
const LATENCY_BUCKETS: [f64; 10] = [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with default latency buckets
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    /// Create a histogram with custom bucket boundaries
    pub fn with_buckets(boundaries: &[f64]) -> Self {
        let buckets = (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in the histogram
    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // Stored as microseconds
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an elapsed duration in milliseconds
    pub fn observe_since(&self, start: Instant) {
        self.observe(start.elapsed().as_secs_f64() * 1000.0);
    }

    /// Cumulative bucket counts, ending with the +Inf bucket
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    /// Get sum of all observed values
    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Get count of observations
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic event counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge for tracking current values
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Per-node protocol metrics
#[derive(Debug)]
pub struct ProtocolMetrics {
    // Coordinator side
    pub tx_counters_assigned: Counter,
    pub query_counters_assigned: Counter,
    pub tx_acks_processed: Counter,
    pub protocol_violations: Counter,

    // Requester side
    pub futures_registered: Counter,
    pub futures_completed: Counter,
    pub futures_cancelled: Counter,
    pub send_failures: Counter,
    pub unmatched_responses: Counter,
    pub dropped_messages: Counter,
    pub response_latency: Histogram,

    pub active_transactions: Gauge,
    pub pending_futures: Gauge,
    /// Futures dropped by their caller before completion
    pub futures_abandoned: Gauge,

    start_time: Instant,
}

impl ProtocolMetrics {
    pub fn new() -> Self {
        Self {
            tx_counters_assigned: Counter::new(),
            query_counters_assigned: Counter::new(),
            tx_acks_processed: Counter::new(),
            protocol_violations: Counter::new(),
            futures_registered: Counter::new(),
            futures_completed: Counter::new(),
            futures_cancelled: Counter::new(),
            send_failures: Counter::new(),
            unmatched_responses: Counter::new(),
            dropped_messages: Counter::new(),
            response_latency: Histogram::new(),
            active_transactions: Gauge::new(),
            pending_futures: Gauge::new(),
            futures_abandoned: Gauge::new(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        let counters: [(&str, &str, &Counter); 10] = [
            (
                "mvcc_tx_counters_assigned_total",
                "Transaction counters assigned by this coordinator",
                &self.tx_counters_assigned,
            ),
            (
                "mvcc_query_counters_assigned_total",
                "Query counters handed out by this coordinator",
                &self.query_counters_assigned,
            ),
            (
                "mvcc_tx_acks_processed_total",
                "Commit and rollback acks processed",
                &self.tx_acks_processed,
            ),
            (
                "mvcc_protocol_violations_total",
                "Duplicate transaction registrations rejected",
                &self.protocol_violations,
            ),
            (
                "mvcc_futures_registered_total",
                "Pending futures registered",
                &self.futures_registered,
            ),
            (
                "mvcc_futures_completed_total",
                "Pending futures completed by a response or at send time",
                &self.futures_completed,
            ),
            (
                "mvcc_futures_cancelled_total",
                "Pending futures cancelled by coordinator loss",
                &self.futures_cancelled,
            ),
            (
                "mvcc_send_failures_total",
                "Messages that could not be sent",
                &self.send_failures,
            ),
            (
                "mvcc_unmatched_responses_total",
                "Responses without a pending future",
                &self.unmatched_responses,
            ),
            (
                "mvcc_dropped_messages_total",
                "Inbound messages that could not be decoded",
                &self.dropped_messages,
            ),
        ];

        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        out.push_str("# HELP mvcc_active_transactions Transactions holding a counter\n");
        out.push_str("# TYPE mvcc_active_transactions gauge\n");
        let _ = writeln!(
            out,
            "mvcc_active_transactions {}",
            self.active_transactions.get()
        );

        out.push_str("# HELP mvcc_pending_futures Requests awaiting a coordinator response\n");
        out.push_str("# TYPE mvcc_pending_futures gauge\n");
        let _ = writeln!(out, "mvcc_pending_futures {}", self.pending_futures.get());

        out.push_str("# HELP mvcc_futures_abandoned Requests dropped by the caller before completion\n");
        out.push_str("# TYPE mvcc_futures_abandoned gauge\n");
        let _ = writeln!(
            out,
            "mvcc_futures_abandoned {}",
            self.futures_abandoned.get()
        );

        out.push_str("# HELP mvcc_uptime_seconds Node uptime in seconds\n");
        out.push_str("# TYPE mvcc_uptime_seconds gauge\n");
        let _ = writeln!(out, "mvcc_uptime_seconds {}", self.uptime().as_secs());

        out.push_str("# HELP mvcc_response_latency_ms Request round trip in milliseconds\n");
        out.push_str("# TYPE mvcc_response_latency_ms histogram\n");
        for (le, count) in self.response_latency.get_buckets() {
            if le.is_infinite() {
                let _ = writeln!(
                    out,
                    "mvcc_response_latency_ms_bucket{{le=\"+Inf\"}} {}",
                    count
                );
            } else {
                let _ = writeln!(
                    out,
                    "mvcc_response_latency_ms_bucket{{le=\"{}\"}} {}",
                    le, count
                );
            }
        }
        let _ = writeln!(
            out,
            "mvcc_response_latency_ms_sum {}",
            self.response_latency.sum()
        );
        let _ = writeln!(
            out,
            "mvcc_response_latency_ms_count {}",
            self.response_latency.count()
        );

        out
    }
}

impl Default for ProtocolMetrics {
    fn default() -> Self {
        Self::new()
    }
}
