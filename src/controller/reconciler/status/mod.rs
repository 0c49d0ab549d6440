//! # Status Reporting
//!
//! Computes and patches the ManagementClusterConfiguration status.

mod conditions;

pub use conditions::{
    build_ready_condition, find_condition, transition_timestamp, upsert_condition, ReadyReason,
    CONDITION_FALSE, CONDITION_TRUE, READY_CONDITION,
};

use crate::constants::{FIELD_MANAGER, RECONCILE_REQUESTED_AT_ANNOTATION};
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{
    FailureStatus, ManagementClusterConfiguration, ManagementClusterConfigurationStatus,
    ReconciliationPhase,
};
use crate::observability::metrics::{set_reconcile_condition, ConfigLabels};
use chrono::{DateTime, SecondsFormat, Utc};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::debug;

/// Outcome of one reconciliation, as reported in the status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub phase: ReconciliationPhase,
    pub reason: ReadyReason,
    pub message: String,
    pub revision: Option<String>,
    pub failures: Vec<FailureStatus>,
    pub missed_exact_matchers: Vec<String>,
}

impl StatusReport {
    #[must_use]
    pub fn succeeded(revision: &str, missed_exact_matchers: Vec<String>) -> Self {
        Self {
            phase: ReconciliationPhase::Ready,
            reason: ReadyReason::ReconciliationSucceeded,
            message: format!("Applied revision: {revision}"),
            revision: Some(revision.to_string()),
            failures: Vec::new(),
            missed_exact_matchers,
        }
    }

    #[must_use]
    pub fn failed(
        revision: &str,
        failures: Vec<FailureStatus>,
        missed_exact_matchers: Vec<String>,
    ) -> Self {
        Self {
            phase: ReconciliationPhase::Failed,
            reason: ReadyReason::ReconciliationFailed,
            message: format!("Attempted revision: {revision}"),
            revision: Some(revision.to_string()),
            failures,
            missed_exact_matchers,
        }
    }

    #[must_use]
    pub fn setup_failed(error: &str, revision: Option<&str>) -> Self {
        Self {
            phase: ReconciliationPhase::Failed,
            reason: ReadyReason::SetupFailed,
            message: format!("Setup failed: {error}"),
            revision: revision.map(str::to_string),
            failures: Vec::new(),
            missed_exact_matchers: Vec::new(),
        }
    }

    #[must_use]
    pub fn source_not_ready(detail: &str) -> Self {
        Self {
            phase: ReconciliationPhase::Failed,
            reason: ReadyReason::SourceNotReady,
            message: format!("Source not ready: {detail}"),
            revision: None,
            failures: Vec::new(),
            missed_exact_matchers: Vec::new(),
        }
    }

    #[must_use]
    pub fn configuration_invalid(detail: &str) -> Self {
        Self {
            phase: ReconciliationPhase::Failed,
            reason: ReadyReason::ConfigurationInvalid,
            message: format!("Invalid configuration: {detail}"),
            revision: None,
            failures: Vec::new(),
            missed_exact_matchers: Vec::new(),
        }
    }

    #[must_use]
    pub fn suspended() -> Self {
        Self {
            phase: ReconciliationPhase::Suspended,
            reason: ReadyReason::Suspended,
            message: "Reconciliation is suspended".to_string(),
            revision: None,
            failures: Vec::new(),
            missed_exact_matchers: Vec::new(),
        }
    }
}

/// Status after `report`, carrying over what the report does not touch
#[must_use]
pub fn build_status(
    mcc: &ManagementClusterConfiguration,
    report: &StatusReport,
    now: DateTime<Utc>,
) -> ManagementClusterConfigurationStatus {
    let previous = mcc.status.clone().unwrap_or_default();
    let generation = mcc.metadata.generation;

    let last_applied_revision = if report.reason == ReadyReason::ReconciliationSucceeded {
        report.revision.clone()
    } else {
        previous.last_applied_revision
    };

    let mut failures = report.failures.clone();
    failures.sort_by(|a, b| a.app_name.cmp(&b.app_name));
    let mut missed_exact_matchers = report.missed_exact_matchers.clone();
    missed_exact_matchers.sort();
    missed_exact_matchers.dedup();

    let ready = build_ready_condition(
        report.reason,
        &report.message,
        generation,
        &previous.conditions,
        now,
    );

    ManagementClusterConfigurationStatus {
        observed_generation: generation,
        last_applied_revision,
        last_attempted_revision: report
            .revision
            .clone()
            .or(previous.last_attempted_revision),
        last_reconciled_at: Some(now.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        last_handled_reconcile_at: mcc
            .annotations()
            .get(RECONCILE_REQUESTED_AT_ANNOTATION)
            .cloned()
            .or(previous.last_handled_reconcile_at),
        phase: Some(report.phase),
        failures,
        missed_exact_matchers,
        conditions: upsert_condition(&previous.conditions, ready),
    }
}

fn config_labels(mcc: &ManagementClusterConfiguration) -> (String, String) {
    (mcc.name_any(), mcc.namespace().unwrap_or_default())
}

/// Write the final status of a reconciliation and update the condition gauge
pub async fn patch_status(
    client: &Client,
    mcc: &ManagementClusterConfiguration,
    report: &StatusReport,
) -> Result<ManagementClusterConfigurationStatus, ReconcilerError> {
    let status = build_status(mcc, report, Utc::now());
    let (name, namespace) = config_labels(mcc);

    let api: Api<ManagementClusterConfiguration> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await?;

    let kind = ManagementClusterConfiguration::kind(&());
    set_reconcile_condition(
        ConfigLabels {
            kind: &kind,
            name: &name,
            namespace: &namespace,
        },
        READY_CONDITION,
        report.reason.status(),
    );
    debug!(
        resource.name = name.as_str(),
        phase = report.phase.as_str(),
        reason = report.reason.as_str(),
        "status.updated"
    );

    Ok(status)
}

/// Record an intermediate phase; skipped when already set
pub async fn set_phase(
    client: &Client,
    mcc: &ManagementClusterConfiguration,
    phase: ReconciliationPhase,
) -> Result<(), ReconcilerError> {
    if mcc.status.as_ref().and_then(|s| s.phase) == Some(phase) {
        return Ok(());
    }

    let (name, namespace) = config_labels(mcc);
    let api: Api<ManagementClusterConfiguration> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": { "phase": phase } });
    api.patch_status(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await?;

    debug!(
        resource.name = name.as_str(),
        phase = phase.as_str(),
        "status.phase"
    );
    Ok(())
}
