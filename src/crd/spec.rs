//! # ManagementClusterConfiguration Spec
//!
//! Main CRD specification types and default values.

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// ManagementClusterConfiguration Custom Resource Definition
///
/// Renders one ConfigMap and one Secret per selected application from the
/// configuration repository tracked by a Flux GitRepository.
///
/// # Example
///
/// ```yaml
/// apiVersion: konfigure.giantswarm.io/v1alpha1
/// kind: ManagementClusterConfiguration
/// metadata:
///   name: example-1
///   namespace: default
/// spec:
///   sources:
///     flux:
///       gitRepository:
///         name: management-clusters-fleet
///         namespace: flux-giantswarm
///   destination:
///     namespace: default
///     naming:
///       suffix: ex1
///   configuration:
///     cluster:
///       name: golem
///     applications:
///       includes:
///         exactMatchers:
///           - app-1
///   reconciliation:
///     interval: 5m
///     retryInterval: 1m
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ManagementClusterConfiguration",
    group = "konfigure.giantswarm.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ManagementClusterConfigurationStatus",
    shortname = "mcc",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Status", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].message"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterConfigurationSpec {
    /// Where the configuration repository comes from
    pub sources: Sources,
    /// Where rendered ConfigMaps and Secrets are written
    pub destination: Destination,
    /// Which cluster and which applications to render
    pub configuration: Configuration,
    /// Requeue intervals
    pub reconciliation: Reconciliation,
    /// Skip reconciliation while true
    /// Existing rendered objects are left in place
    #[serde(default = "default_false")]
    pub suspend: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sources {
    pub flux: FluxSource,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FluxSource {
    /// Source-controller service override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<FluxService>,
    /// GitRepository holding the configuration repository
    pub git_repository: GitRepositoryReference,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FluxService {
    /// Host of the source-controller service, optionally with a scheme
    /// Default: source-controller.flux-system.svc
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryReference {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Namespace the rendered objects are written to
    pub namespace: String,
    #[serde(default)]
    pub naming: Naming,
}

/// Naming of rendered objects: `prefix-app-suffix`
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Naming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "naming_affix_schema")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "naming_affix_schema")]
    pub suffix: Option<String>,
    /// Join the parts with `-`
    #[serde(default = "default_true")]
    pub use_separator: bool,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            prefix: None,
            suffix: None,
            use_separator: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub cluster: ClusterReference,
    #[serde(default)]
    pub applications: Applications,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReference {
    /// Selects `installations/<name>` in the configuration repository
    pub name: String,
}

/// Application selection
///
/// Includes narrow the catalogue, excludes are removed afterwards.
/// No include matchers at all selects every application.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Applications {
    #[serde(default)]
    pub includes: Matchers,
    #[serde(default)]
    pub excludes: Matchers,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Matchers {
    #[serde(default)]
    pub exact_matchers: Vec<String>,
    /// Unanchored regular expressions
    #[serde(default)]
    pub regex_matchers: Vec<String>,
}

impl Matchers {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact_matchers.is_empty() && self.regex_matchers.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// Requeue interval after a successful reconciliation
    /// Format: Go duration string (e.g., "30s", "5m", "1h30m")
    #[schemars(schema_with = "duration_schema")]
    pub interval: String,
    /// Requeue interval after a failed reconciliation
    /// Default: same as interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_duration_schema")]
    pub retry_interval: Option<String>,
}

const DURATION_PATTERN: &str = r"^([0-9]+(\.[0-9]+)?(ms|s|m|h))+$";
const NAMING_AFFIX_PATTERN: &str = r"^[a-z0-9]([-a-z0-9]{0,4}[a-z0-9])?$";

fn duration_schema(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "string",
        "pattern": DURATION_PATTERN
    })
}

fn optional_duration_schema(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "string",
        "nullable": true,
        "pattern": DURATION_PATTERN
    })
}

fn naming_affix_schema(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "string",
        "nullable": true,
        "pattern": NAMING_AFFIX_PATTERN
    })
}

/// Default value for boolean true
pub fn default_true() -> bool {
    true
}

/// Default value for boolean false
pub fn default_false() -> bool {
    false
}
