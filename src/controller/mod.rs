//! # Controller
//!
//! Core controller modules for the konfigure operator.
//!
//! - `backoff`: Fibonacci backoff for unexpected reconciliation errors
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
