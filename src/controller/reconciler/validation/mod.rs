//! # Validation
//!
//! Validates ManagementClusterConfiguration resources and duration strings.

mod config;
mod duration;
mod kubernetes;

pub use config::{validate_management_cluster_configuration, ValidatedIntervals};
pub use duration::{parse_go_duration, validate_duration_interval};
pub use kubernetes::{validate_kubernetes_name, validate_kubernetes_namespace, validate_naming_affix};
