//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `cb_operations_total{operation}` - Operations run, by kind
//! - `cb_rejections_total{operation}` - Soft rejections, by kind
//! - `cb_pools_created_total` - Pools persisted
//! - `cb_banked_gco2eq_total` - Surplus moved into the bank
//! - `cb_applied_gco2eq_total` - Banked surplus applied
//! - `cb_operation_duration_seconds` - Latency of mutating operations

use prometheus::{
    Counter, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Operations by kind
    pub operations_total: IntCounterVec,

    /// Soft rejections by kind
    pub rejections_total: IntCounterVec,

    /// Pools persisted
    pub pools_total: IntCounter,

    /// gCO₂e banked
    pub banked_total: Counter,

    /// gCO₂e applied
    pub applied_total: Counter,

    /// Operation latency
    pub operation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("cb_operations_total", "Ledger operations run"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("cb_rejections_total", "Operations refused by business rules"),
            &["operation"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let pools_total = IntCounter::new("cb_pools_created_total", "Pools persisted")?;
        registry.register(Box::new(pools_total.clone()))?;

        let banked_total = Counter::new("cb_banked_gco2eq_total", "Surplus moved into the bank")?;
        registry.register(Box::new(banked_total.clone()))?;

        let applied_total = Counter::new("cb_applied_gco2eq_total", "Banked surplus applied")?;
        registry.register(Box::new(applied_total.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "cb_operation_duration_seconds",
                "Latency of mutating ledger operations",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            operations_total,
            rejections_total,
            pools_total,
            banked_total,
            applied_total,
            operation_duration,
            registry,
        })
    }

    /// Record an operation and its latency
    pub fn record_operation(&self, operation: &str, duration_seconds: f64) {
        self.operations_total.with_label_values(&[operation]).inc();
        self.operation_duration.observe(duration_seconds);
    }

    /// Record a soft rejection
    pub fn record_rejection(&self, operation: &str) {
        self.rejections_total.with_label_values(&[operation]).inc();
    }

    /// Record banked surplus
    pub fn record_banked(&self, amount: Decimal) {
        self.banked_total.inc_by(amount.to_f64().unwrap_or(0.0));
    }

    /// Record applied surplus
    pub fn record_applied(&self, amount: Decimal) {
        self.applied_total.inc_by(amount.to_f64().unwrap_or(0.0));
    }

    /// Record a persisted pool
    pub fn record_pool_created(&self) {
        self.pools_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
