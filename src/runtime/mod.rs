//! # Runtime
//!
//! Process-level wiring of the operator.
//!
//! - `initialization.rs` - rustls, tracing, metrics, HTTP server, client and reconciler setup
//! - `watch_loop.rs` - Controller watch loop and trigger decisions
//! - `error_policy.rs` - Reconciliation error backoff and watch stream error handling

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
