//! # Reconciliation Finalization
//!
//! Writes the final status, records metrics and decides the next requeue.

use super::schedule::requeue_after;
use crate::controller::reconciler::status::{patch_status, ReadyReason, StatusReport};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::ValidatedIntervals;
use crate::crd::ManagementClusterConfiguration;
use crate::observability::metrics::{
    increment_requeues_total, observe_reconcile_duration, ConfigLabels,
};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::time::Instant;
use tracing::{info, warn};

/// Report `report` and translate it into the controller action
pub async fn finish_reconciliation(
    reconciler: &Reconciler,
    mcc: &ManagementClusterConfiguration,
    report: &StatusReport,
    intervals: Option<&ValidatedIntervals>,
    start: Instant,
) -> Result<Action, ReconcilerError> {
    let name = mcc.name_any();
    let namespace = mcc.namespace().unwrap_or_default();

    patch_status(&reconciler.client, mcc, report).await?;

    let kind = ManagementClusterConfiguration::kind(&());
    observe_reconcile_duration(
        ConfigLabels {
            kind: &kind,
            name: &name,
            namespace: &namespace,
        },
        start.elapsed().as_secs_f64(),
    );

    if report.reason == ReadyReason::ReconciliationSucceeded {
        if let Some(uid) = mcc.uid() {
            reconciler.reset_backoff(&uid);
        }
        info!(
            resource.name = name.as_str(),
            "Reconciliation complete: {} (duration: {:.2}s)",
            report.message,
            start.elapsed().as_secs_f64()
        );
    } else {
        warn!(
            resource.name = name.as_str(),
            reason = report.reason.as_str(),
            failures = report.failures.len(),
            "Reconciliation did not succeed: {}",
            report.message
        );
    }

    let Some(intervals) = intervals else {
        increment_requeues_total("await-change");
        return Ok(Action::await_change());
    };

    match requeue_after(report.reason, intervals) {
        Some(delay) => {
            let trigger = if report.reason == ReadyReason::ReconciliationSucceeded {
                "timer-based"
            } else {
                "retry"
            };
            increment_requeues_total(trigger);
            info!(
                resource.name = name.as_str(),
                "Next reconciliation in {}s ({})",
                delay.as_secs(),
                trigger
            );
            Ok(Action::requeue(delay))
        }
        None => {
            increment_requeues_total("await-change");
            Ok(Action::await_change())
        }
    }
}
