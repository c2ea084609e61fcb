// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub use server::start_metrics_server;

use crate::utils::CircuitState;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Queue ingestion (outcomes, failure reasons, per-message latency)
// - Cache effectiveness (lookups by result, failed write-backs)
// - Read path (which source answered)
// - Bulk transactions
// - Cache circuit breaker state
//
// All metrics are registered with one registry, scraped via /metrics.
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub orders_consumed: IntCounterVec,
    pub ingest_failures: IntCounterVec,
    pub processing_duration: Histogram,

    // Cache
    pub cache_lookups: IntCounterVec,
    pub cache_writeback_failures: IntCounter,
    pub cache_circuit_breaker_state: IntGauge,

    // Query gateway
    pub order_reads: IntCounterVec,
    pub bulk_requests: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_consumed = IntCounterVec::new(
            Opts::new("orders_consumed_total", "Queue messages by terminal outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(orders_consumed.clone()))?;

        let ingest_failures = IntCounterVec::new(
            Opts::new("order_ingest_failures_total", "Ingestion failures by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(ingest_failures.clone()))?;

        let processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "order_processing_duration_seconds",
                "Time to decode, validate and persist one queue message",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Cache lookups by result"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        let cache_writeback_failures = IntCounter::new(
            "cache_writeback_failures_total",
            "Detached cache write-backs that failed",
        )?;
        registry.register(Box::new(cache_writeback_failures.clone()))?;

        let cache_circuit_breaker_state = IntGauge::new(
            "cache_circuit_breaker_state",
            "Cache circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(cache_circuit_breaker_state.clone()))?;

        let order_reads = IntCounterVec::new(
            Opts::new("order_reads_total", "Point reads by answering source"),
            &["source"],
        )?;
        registry.register(Box::new(order_reads.clone()))?;

        let bulk_requests = IntCounterVec::new(
            Opts::new("bulk_requests_total", "Bulk transactional requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(bulk_requests.clone()))?;

        Ok(Self {
            registry,
            orders_consumed,
            ingest_failures,
            processing_duration,
            cache_lookups,
            cache_writeback_failures,
            cache_circuit_breaker_state,
            order_reads,
            bulk_requests,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_consumed(&self, outcome: &str, duration_secs: f64) {
        self.orders_consumed.with_label_values(&[outcome]).inc();
        self.processing_duration.observe(duration_secs);
    }

    pub fn record_ingest_failure(&self, reason: &str) {
        self.ingest_failures.with_label_values(&[reason]).inc();
    }

    pub fn record_cache_lookup(&self, result: &str) {
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    pub fn record_writeback_failure(&self) {
        self.cache_writeback_failures.inc();
    }

    pub fn record_read(&self, source: &str) {
        self.order_reads.with_label_values(&[source]).inc();
    }

    pub fn record_bulk(&self, outcome: &str) {
        self.bulk_requests.with_label_values(&[outcome]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        self.cache_circuit_breaker_state.set(state.as_gauge());
    }
}
