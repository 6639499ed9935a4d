//! Benchmark scoring engine.
//!
//! Pure functions only; callers own caching, persistence and audit.

pub mod engine;

pub use engine::BenchmarkEngine;
