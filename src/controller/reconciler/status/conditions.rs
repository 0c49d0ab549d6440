//! # Conditions
//!
//! The `Ready` condition and its reasons.

use crate::crd::Condition;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

pub const READY_CONDITION: &str = "Ready";
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

/// Reason of the `Ready` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyReason {
    ReconciliationSucceeded,
    ReconciliationFailed,
    SetupFailed,
    SourceNotReady,
    ConfigurationInvalid,
    Suspended,
}

impl ReadyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReconciliationSucceeded => "ReconciliationSucceeded",
            Self::ReconciliationFailed => "ReconciliationFailed",
            Self::SetupFailed => "SetupFailed",
            Self::SourceNotReady => "SourceNotReady",
            Self::ConfigurationInvalid => "ConfigurationInvalid",
            Self::Suspended => "Suspended",
        }
    }

    /// Condition status implied by the reason
    #[must_use]
    pub fn status(self) -> &'static str {
        if self == Self::ReconciliationSucceeded {
            CONDITION_TRUE
        } else {
            CONDITION_FALSE
        }
    }
}

impl std::fmt::Display for ReadyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Second-truncated RFC3339 UTC timestamp used for `lastTransitionTime`
#[must_use]
pub fn transition_timestamp(now: DateTime<Utc>) -> String {
    now.trunc_subsecs(0)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[must_use]
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Build the `Ready` condition
///
/// `lastTransitionTime` is carried over from `previous` when the status is unchanged.
#[must_use]
pub fn build_ready_condition(
    reason: ReadyReason,
    message: &str,
    generation: Option<i64>,
    previous: &[Condition],
    now: DateTime<Utc>,
) -> Condition {
    let status = reason.status();
    let last_transition_time = find_condition(previous, READY_CONDITION)
        .filter(|c| c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| transition_timestamp(now));

    Condition {
        r#type: READY_CONDITION.to_string(),
        status: status.to_string(),
        observed_generation: generation,
        last_transition_time: Some(last_transition_time),
        reason: Some(reason.as_str().to_string()),
        message: Some(message.to_string()),
    }
}

/// Replace the condition of the same type, keeping the others in place
#[must_use]
pub fn upsert_condition(conditions: &[Condition], condition: Condition) -> Vec<Condition> {
    let mut updated: Vec<Condition> = conditions
        .iter()
        .filter(|c| c.r#type != condition.r#type)
        .cloned()
        .collect();
    updated.push(condition);
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, nanos).single().unwrap()
    }

    #[test]
    fn test_transition_timestamp_truncates() {
        assert_eq!(
            transition_timestamp(at(1_700_000_000, 999_000_000)),
            "2023-11-14T22:13:20Z"
        );
    }

    #[test]
    fn test_ready_condition_status() {
        let ok = build_ready_condition(
            ReadyReason::ReconciliationSucceeded,
            "Applied revision: abc",
            Some(2),
            &[],
            at(1_700_000_000, 0),
        );
        assert_eq!(ok.status, "True");
        assert_eq!(ok.reason.as_deref(), Some("ReconciliationSucceeded"));
        assert_eq!(ok.observed_generation, Some(2));

        let failed = build_ready_condition(
            ReadyReason::SetupFailed,
            "Setup failed: no keys",
            Some(2),
            &[],
            at(1_700_000_000, 0),
        );
        assert_eq!(failed.status, "False");
    }

    #[test]
    fn test_transition_time_preserved_when_status_unchanged() {
        let first = build_ready_condition(
            ReadyReason::ReconciliationFailed,
            "Attempted revision: a",
            Some(1),
            &[],
            at(1_700_000_000, 0),
        );
        let still_failing = build_ready_condition(
            ReadyReason::SourceNotReady,
            "Source not ready: x",
            Some(1),
            std::slice::from_ref(&first),
            at(1_700_000_600, 0),
        );
        assert_eq!(still_failing.last_transition_time, first.last_transition_time);

        let recovered = build_ready_condition(
            ReadyReason::ReconciliationSucceeded,
            "Applied revision: b",
            Some(1),
            &[still_failing],
            at(1_700_000_900, 0),
        );
        assert_eq!(
            recovered.last_transition_time.as_deref(),
            Some("2023-11-14T22:28:20Z")
        );
    }

    #[test]
    fn test_upsert_condition_replaces_same_type() {
        let other = Condition {
            r#type: "Reconciling".to_string(),
            status: "True".to_string(),
            observed_generation: None,
            last_transition_time: None,
            reason: None,
            message: None,
        };
        let ready = build_ready_condition(
            ReadyReason::Suspended,
            "Reconciliation is suspended",
            None,
            &[],
            at(0, 0),
        );
        let conditions = upsert_condition(&[other.clone(), ready.clone()], ready);
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0], other);
    }
}
