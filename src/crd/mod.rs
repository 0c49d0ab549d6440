//! # Custom Resource Definitions
//!
//! CRD types for the konfigure operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `ManagementClusterConfiguration` specification and default values
//! - `status.rs` - Status types for tracking reconciliation state and conditions

mod spec;
mod status;

pub use spec::{
    Applications, ClusterReference, Configuration, Destination, FluxService, FluxSource,
    GitRepositoryReference, ManagementClusterConfiguration, ManagementClusterConfigurationSpec,
    Matchers, Naming, Reconciliation, Sources, default_false, default_true,
};
pub use status::{
    Condition, FailureStatus, ManagementClusterConfigurationStatus, ReconciliationPhase,
};
