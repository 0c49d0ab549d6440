//! # Reconciler
//!
//! Core reconciliation logic for `ManagementClusterConfiguration` resources.
//!
//! The reconciler:
//! - Watches `ManagementClusterConfiguration` resources across all namespaces
//! - Fetches the artifact of the referenced Flux `GitRepository`
//! - Selects applications from the repository catalogue with include/exclude matchers
//! - Renders a ConfigMap and a Secret per application, decrypting SOPS content
//! - Writes them with ownership labels and reports the outcome in the status
//!
//! ## Reconciliation Flow
//!
//! 1. Handle deletion (finalizer) and suspension
//! 2. Validate the spec and compile matchers
//! 3. Fetch and extract the GitRepository artifact
//! 4. Prepare the cluster-wide context (base config, cluster patch, cluster secrets)
//! 5. Resolve applications, then render, pre-flight and write each one
//! 6. Update status and requeue

pub mod artifact;
pub mod reconcile;
pub mod render;
pub mod resolve;
pub mod sops;
pub mod source;
pub mod status;
pub mod types;
pub mod validation;
pub mod writer;

// Re-export public API
pub use reconcile::{reconcile, time_until_due};
pub use sops::start_sops_key_watch;
pub use types::{BackoffState, Reconciler, ReconcilerError, TriggerSource};
