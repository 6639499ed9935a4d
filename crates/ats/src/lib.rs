//! OAuth token lifecycle and rate-limit-aware HTTP client for the ATS.

pub mod backoff;
pub mod circuit;
pub mod client;
pub mod config;
pub mod health;
pub mod token;
pub mod wire;

pub use backoff::Backoff;
pub use circuit::{CircuitBreaker, CircuitPermit, CircuitState};
pub use client::*;
pub use config::AtsConfig;
pub use token::*;
pub use wire::*;
