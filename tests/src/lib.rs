//! Shared harness for the end-to-end tests.

pub mod fixtures;
pub mod mocks;
pub mod setup;
