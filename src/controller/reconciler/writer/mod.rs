//! # Writer
//!
//! Ownership rules and writes of the rendered ConfigMaps and Secrets.

pub mod apply;
pub mod ownership;

pub use apply::{
    apply_desired_objects, build_desired_objects, delete_owned_objects, merge_into_existing,
    preflight, DesiredObjects, OwnedObject, WriteOutcome,
};
pub use ownership::{
    app_from_resource_name, filter_external_from_map, generate_ownership_labels, match_ownership,
    owned_objects_selector, resource_name, should_reconcile, MATCHED_OWNERSHIP_LABELS,
};
