//! konfigure-operator Library
//!
//! Renders per-app ConfigMaps and Secrets for a management cluster from a
//! Flux GitRepository artifact, decrypting SOPS/AGE-encrypted values.
//! Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use konfigure_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
