//! # HTTP Middleware
//!
//! - `metrics` — request and error counters through the `metrics` facade.

pub mod metrics;
