//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `konfigure_operator_reconcile_condition` - One-hot gauge of the Ready condition per CR
//! - `konfigure_operator_generation` - 1 when an app rendered and applied, 0 when it failed
//! - `konfigure_operator_reconcile_duration_seconds` - Duration of reconciliations per CR
//! - `konfigure_operator_reconciliations_total` - Total number of reconciliations
//! - `konfigure_operator_reconciliation_errors_total` - Total number of reconciliation errors
//! - `konfigure_operator_requeues_total` - Requeues by reason
//! - `konfigure_operator_artifact_*` - GitRepository artifact downloads and extractions
//! - `konfigure_operator_sops_*` - SOPS decryption operations
//! - `konfigure_operator_object_writes_total` - ConfigMap/Secret writes by kind and outcome

use anyhow::Result;
use prometheus::{
    GaugeVec, Histogram, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

const CONDITION_STATUSES: [&str; 3] = ["True", "False", "Unknown"];

/// `count` buckets spread exponentially between `min` and `max`
fn exponential_buckets_range(min: f64, max: f64, count: i32) -> Vec<f64> {
    let factor = (max / min).powf(1.0 / f64::from(count - 1));
    (0..count).map(|i| min * factor.powi(i)).collect()
}

static RECONCILE_CONDITION: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        Opts::new(
            "konfigure_operator_reconcile_condition",
            "The current condition status of a reconciled configuration resource",
        ),
        &[
            "config_kind",
            "config_name",
            "config_namespace",
            "condition_type",
            "condition_status",
        ],
    )
    .expect("Failed to create RECONCILE_CONDITION metric - this should never happen")
});

static GENERATION: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        Opts::new(
            "konfigure_operator_generation",
            "Whether the last generation of an app configuration succeeded (1) or failed (0)",
        ),
        &[
            "resource_kind",
            "resource_name",
            "resource_namespace",
            "app_name",
            "config_cluster_name",
            "destination_namespace",
        ],
    )
    .expect("Failed to create GENERATION metric - this should never happen")
});

static RECONCILE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "konfigure_operator_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(exponential_buckets_range(10e-3, 1800.0, 10)),
        &["config_kind", "config_name", "config_namespace"],
    )
    .expect("Failed to create RECONCILE_DURATION metric - this should never happen")
});

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konfigure_operator_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konfigure_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "konfigure_operator_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static ARTIFACT_DOWNLOADS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konfigure_operator_artifact_downloads_total",
        "Total number of GitRepository artifact downloads",
    )
    .expect("Failed to create ARTIFACT_DOWNLOADS_TOTAL metric - this should never happen")
});

static ARTIFACT_DOWNLOAD_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konfigure_operator_artifact_download_errors_total",
        "Total number of GitRepository artifact download errors",
    )
    .expect("Failed to create ARTIFACT_DOWNLOAD_ERRORS_TOTAL metric - this should never happen")
});

static ARTIFACT_DOWNLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "konfigure_operator_artifact_download_duration_seconds",
            "Duration of GitRepository artifact downloads in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create ARTIFACT_DOWNLOAD_DURATION metric - this should never happen")
});

static ARTIFACT_EXTRACTIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konfigure_operator_artifact_extractions_total",
        "Total number of GitRepository artifact extractions",
    )
    .expect("Failed to create ARTIFACT_EXTRACTIONS_TOTAL metric - this should never happen")
});

static ARTIFACT_EXTRACTION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konfigure_operator_artifact_extraction_errors_total",
        "Total number of GitRepository artifact extraction errors",
    )
    .expect("Failed to create ARTIFACT_EXTRACTION_ERRORS_TOTAL metric - this should never happen")
});

static SOPS_DECRYPTION_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konfigure_operator_sops_decryption_total",
        "Total number of SOPS decryption operations",
    )
    .expect("Failed to create SOPS_DECRYPTION_TOTAL metric - this should never happen")
});

static SOPS_DECRYPTION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "konfigure_operator_sops_decryption_duration_seconds",
            "Duration of SOPS decryption operations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create SOPS_DECRYPTION_DURATION metric - this should never happen")
});

static SOPS_DECRYPTION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "konfigure_operator_sops_decryption_errors_total",
            "Total number of SOPS decryption errors by failure reason",
        ),
        &["reason"],
    )
    .expect("Failed to create SOPS_DECRYPTION_ERRORS_TOTAL metric - this should never happen")
});

static OBJECT_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "konfigure_operator_object_writes_total",
            "Rendered ConfigMap/Secret writes by kind and outcome",
        ),
        &["kind", "outcome"],
    )
    .expect("Failed to create OBJECT_WRITES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Registration only fails on duplicate registration"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILE_CONDITION.clone()))?;
    REGISTRY.register(Box::new(GENERATION.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_DOWNLOADS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_DOWNLOAD_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_DOWNLOAD_DURATION.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_EXTRACTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_EXTRACTION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SOPS_DECRYPTION_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SOPS_DECRYPTION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SOPS_DECRYPTION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OBJECT_WRITES_TOTAL.clone()))?;

    Ok(())
}

/// Identity labels of a reconciled CR
#[derive(Debug, Clone, Copy)]
pub struct ConfigLabels<'a> {
    pub kind: &'a str,
    pub name: &'a str,
    pub namespace: &'a str,
}

/// Set the condition gauge one-hot: the current status is 1, the other two are 0
pub fn set_reconcile_condition(config: ConfigLabels<'_>, condition_type: &str, status: &str) {
    for candidate in CONDITION_STATUSES {
        let value = if candidate == status { 1.0 } else { 0.0 };
        RECONCILE_CONDITION
            .with_label_values(&[
                config.kind,
                config.name,
                config.namespace,
                condition_type,
                candidate,
            ])
            .set(value);
    }
}

/// Drop every condition series of a deleted CR
pub fn remove_reconcile_condition(config: ConfigLabels<'_>, condition_type: &str) {
    for candidate in CONDITION_STATUSES {
        let _ = RECONCILE_CONDITION.remove_label_values(&[
            config.kind,
            config.name,
            config.namespace,
            condition_type,
            candidate,
        ]);
    }
}

#[must_use]
pub fn reconcile_condition_value(
    config: ConfigLabels<'_>,
    condition_type: &str,
    status: &str,
) -> f64 {
    RECONCILE_CONDITION
        .with_label_values(&[
            config.kind,
            config.name,
            config.namespace,
            condition_type,
            status,
        ])
        .get()
}

/// Labels of one app generation
#[derive(Debug, Clone, Copy)]
pub struct GenerationLabels<'a> {
    pub config: ConfigLabels<'a>,
    pub app_name: &'a str,
    pub cluster_name: &'a str,
    pub destination_namespace: &'a str,
}

impl GenerationLabels<'_> {
    fn values(&self) -> [&str; 6] {
        [
            self.config.kind,
            self.config.name,
            self.config.namespace,
            self.app_name,
            self.cluster_name,
            self.destination_namespace,
        ]
    }
}

pub fn set_generation(labels: GenerationLabels<'_>, success: bool) {
    GENERATION
        .with_label_values(&labels.values())
        .set(if success { 1.0 } else { 0.0 });
}

pub fn remove_generation(labels: GenerationLabels<'_>) {
    let _ = GENERATION.remove_label_values(&labels.values());
}

#[must_use]
pub fn generation_value(labels: GenerationLabels<'_>) -> f64 {
    GENERATION.with_label_values(&labels.values()).get()
}

pub fn observe_reconcile_duration(config: ConfigLabels<'_>, duration: f64) {
    RECONCILE_DURATION
        .with_label_values(&[config.kind, config.name, config.namespace])
        .observe(duration);
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_artifact_downloads_total() {
    ARTIFACT_DOWNLOADS_TOTAL.inc();
}

pub fn increment_artifact_download_errors_total() {
    ARTIFACT_DOWNLOAD_ERRORS_TOTAL.inc();
}

pub fn observe_artifact_download_duration(duration: f64) {
    ARTIFACT_DOWNLOAD_DURATION.observe(duration);
}

pub fn increment_artifact_extractions_total() {
    ARTIFACT_EXTRACTIONS_TOTAL.inc();
}

pub fn increment_artifact_extraction_errors_total() {
    ARTIFACT_EXTRACTION_ERRORS_TOTAL.inc();
}

pub fn increment_sops_decryption_total() {
    SOPS_DECRYPTION_TOTAL.inc();
}

pub fn observe_sops_decryption_duration(duration: f64) {
    SOPS_DECRYPTION_DURATION.observe(duration);
}

pub fn increment_sops_decryption_errors_total_with_reason(reason: &str) {
    SOPS_DECRYPTION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_object_writes_total(kind: &str, outcome: &str) {
    OBJECT_WRITES_TOTAL.with_label_values(&[kind, outcome]).inc();
}
