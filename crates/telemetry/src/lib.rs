//! Tracing, metrics and health reporting for the talent pipeline.
//!
//! Nothing in here is a process global: the binary builds one `Metrics` and
//! one `HealthRegistry` and hands `Arc`s of them to every component.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
