//! # Schedule
//!
//! When the next periodic reconciliation of a CR is due.

use crate::controller::reconciler::status::{find_condition, ReadyReason, READY_CONDITION};
use crate::controller::reconciler::validation::ValidatedIntervals;
use crate::crd::{ManagementClusterConfigurationStatus, ReconciliationPhase};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Requeue delay after a reconciliation ending with `reason`
///
/// `None` means the CR has to change before anything can improve.
#[must_use]
pub fn requeue_after(reason: ReadyReason, intervals: &ValidatedIntervals) -> Option<Duration> {
    match reason {
        ReadyReason::ReconciliationSucceeded => Some(intervals.interval),
        ReadyReason::ConfigurationInvalid | ReadyReason::Suspended => None,
        ReadyReason::ReconciliationFailed
        | ReadyReason::SetupFailed
        | ReadyReason::SourceNotReady => Some(intervals.retry_interval),
    }
}

/// Time left until the periodic reconciliation is due, zero when overdue
///
/// `None` when the status carries no schedule (never reconciled, invalid or suspended).
/// A run left in `Pending` or `Rendering` is retried after the retry interval.
#[must_use]
pub fn time_until_due(
    status: Option<&ManagementClusterConfigurationStatus>,
    intervals: &ValidatedIntervals,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let status = status?;
    let ready_reason = find_condition(&status.conditions, READY_CONDITION)
        .and_then(|c| c.reason.as_deref());
    if ready_reason == Some(ReadyReason::ConfigurationInvalid.as_str()) {
        return None;
    }
    let last = DateTime::parse_from_rfc3339(status.last_reconciled_at.as_deref()?)
        .ok()?
        .with_timezone(&Utc);

    let period = match status.phase? {
        ReconciliationPhase::Ready => intervals.interval,
        ReconciliationPhase::Failed
        | ReconciliationPhase::Pending
        | ReconciliationPhase::Rendering => intervals.retry_interval,
        ReconciliationPhase::Suspended => return None,
    };

    let due = last + chrono::Duration::from_std(period).ok()?;
    Some((due - now).to_std().unwrap_or(Duration::ZERO))
}
