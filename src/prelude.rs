//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use konfigure_operator::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (ManagementClusterConfiguration, Matchers, etc.)
//! - Reconciler types (Reconciler, ReconcilerError, etc.)
//! - Config types (ControllerConfig, ServerConfig)
//! - Common error types

pub use crate::crd::*;

pub use crate::controller::reconciler::{
    reconcile, BackoffState, Reconciler, ReconcilerError, TriggerSource,
};

pub use crate::config::{
    ControllerConfig, ServerConfig, SharedControllerConfig, SharedServerConfig,
};

pub use crate::controller::reconciler::render::RenderError;
pub use crate::controller::reconciler::sops::{SopsDecryptionError, SopsDecryptionFailureReason};
