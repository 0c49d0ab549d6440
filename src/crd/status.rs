//! # ManagementClusterConfiguration Status
//!
//! Status types for tracking reconciliation state and conditions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the ManagementClusterConfiguration resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterConfigurationStatus {
    /// Generation of the spec the status was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Revision of the last fully successful reconciliation
    #[serde(default)]
    pub last_applied_revision: Option<String>,
    /// Revision of the last attempt, successful or not
    #[serde(default)]
    pub last_attempted_revision: Option<String>,
    /// Time of the last reconciliation (RFC3339, nanoseconds)
    #[serde(default)]
    pub last_reconciled_at: Option<String>,
    /// Value of the `reconcile-requested-at` annotation last acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_handled_reconcile_at: Option<String>,
    #[serde(default)]
    pub phase: Option<ReconciliationPhase>,
    /// Per-application failures of the last attempt, sorted by application name
    #[serde(default)]
    pub failures: Vec<FailureStatus>,
    /// Exact include matchers that matched no application
    #[serde(default)]
    pub missed_exact_matchers: Vec<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
pub enum ReconciliationPhase {
    Pending,
    Rendering,
    Ready,
    Failed,
    Suspended,
}

impl ReconciliationPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Rendering => "Rendering",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
            Self::Suspended => "Suspended",
        }
    }
}

impl fmt::Display for ReconciliationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailureStatus {
    pub app_name: String,
    pub message: String,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last transition time (RFC3339, second precision)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// CamelCase reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
