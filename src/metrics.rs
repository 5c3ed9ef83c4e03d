// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the provisioning core.
//!
//! All metrics carry the `glinr_edge` namespace prefix and are registered in
//! [`METRICS_REGISTRY`], which the status server exposes on `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Verification Metrics** - Challenge checks by result
//! - **Pipeline Metrics** - Provisioning runs by outcome and duration
//! - **Certificate Metrics** - Issuance and renewal outcomes
//! - **Proxy Metrics** - Reconciles by outcome and duration
//! - **Resource Lifecycle Metrics** - Domains and routes created and deleted
//! - **Error Metrics** - Failures by component and class
//!
//! # Example
//!
//! ```rust,no_run
//! use glinr_edge::metrics::{gather_metrics, record_verification_check};
//!
//! record_verification_check("matched");
//! let text = gather_metrics().unwrap();
//! ```

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "glinr_edge";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Verification Metrics
// ============================================================================

/// Total number of challenge checks
///
/// Labels:
/// - `result`: `matched`, `mismatch` or `error`
pub static VERIFICATION_CHECKS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_verification_checks_total"),
        "Total number of domain verification checks by result",
    );
    let counter = CounterVec::new(opts, &["result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Pipeline Metrics
// ============================================================================

/// Total number of finished provisioning runs
///
/// Labels:
/// - `outcome`: `complete` or `error`
/// - `stage`: Stage the run ended at
pub static PIPELINE_RUNS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_pipeline_runs_total"),
        "Total number of provisioning pipeline runs by outcome and final stage",
    );
    let counter = CounterVec::new(opts, &["outcome", "stage"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of provisioning runs in seconds
///
/// Labels:
/// - `outcome`: `complete` or `error`
pub static PIPELINE_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_pipeline_duration_seconds"),
        "Duration of provisioning pipeline runs in seconds",
    )
    .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0, 300.0, 600.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Certificate Metrics
// ============================================================================

/// Total number of certificate operations
///
/// Labels:
/// - `operation`: `issue` or `renew`
/// - `outcome`: `success` or `error`
pub static CERTIFICATE_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_certificate_operations_total"),
        "Total number of certificate issuances and renewals by outcome",
    );
    let counter = CounterVec::new(opts, &["operation", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Proxy Metrics
// ============================================================================

/// Total number of proxy reconciles
///
/// Labels:
/// - `outcome`: `applied`, `rejected` or `reload_failed`
pub static PROXY_RECONCILES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_proxy_reconciles_total"),
        "Total number of proxy configuration reconciles by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of proxy reconciles in seconds
pub static PROXY_RECONCILE_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_proxy_reconcile_duration_seconds"),
        "Duration of proxy configuration reconciles in seconds",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Object Lifecycle Metrics
// ============================================================================

/// Domains, certificates and routes created or deleted
///
/// Labels:
/// - `kind`: `domain`, `certificate` or `route`
/// - `change`: `created` or `deleted`
pub static OBJECT_CHANGES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_object_changes_total"),
        "Stored objects created or deleted, by kind",
    );
    let counter = CounterVec::new(opts, &["kind", "change"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by component and class
///
/// Labels:
/// - `component`: `domain`, `certificate`, `proxy`, `route`
/// - `class`: `transient` or `rejected`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by component and class",
    );
    let counter = CounterVec::new(opts, &["component", "class"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a challenge check
///
/// # Arguments
/// * `result` - `matched`, `mismatch` or `error`
pub fn record_verification_check(result: &str) {
    VERIFICATION_CHECKS_TOTAL.with_label_values(&[result]).inc();
}

/// Record a finished provisioning run
///
/// # Arguments
/// * `outcome` - `complete` or `error`
/// * `stage` - Stage the run ended at
/// * `duration` - Wall time of the run
pub fn record_pipeline_run(outcome: &str, stage: &str, duration: Duration) {
    PIPELINE_RUNS_TOTAL
        .with_label_values(&[outcome, stage])
        .inc();
    PIPELINE_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Record a certificate issuance or renewal
pub fn record_certificate_operation(operation: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    CERTIFICATE_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record a proxy reconcile
///
/// # Arguments
/// * `outcome` - `applied`, `rejected` or `reload_failed`
/// * `duration` - Duration of the reconcile
pub fn record_reconcile(outcome: &str, duration: Duration) {
    PROXY_RECONCILES_TOTAL.with_label_values(&[outcome]).inc();
    PROXY_RECONCILE_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn record_object_created(kind: &str) {
    OBJECT_CHANGES_TOTAL
        .with_label_values(&[kind, "created"])
        .inc();
}

pub fn record_object_deleted(kind: &str) {
    OBJECT_CHANGES_TOTAL
        .with_label_values(&[kind, "deleted"])
        .inc();
}

/// Record an error
///
/// # Arguments
/// * `component` - Component that failed
/// * `transient` - Whether the failure is expected to clear on retry
pub fn record_error(component: &str, transient: bool) {
    let class = if transient { "transient" } else { "rejected" };
    ERRORS_TOTAL.with_label_values(&[component, class]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
