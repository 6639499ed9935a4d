//! Core types, error taxonomy, and validation for the talent pipeline.

pub mod access;
pub mod benchmark;
pub mod candidate;
pub mod error;
pub mod events;
pub mod ids;
pub mod limits;
pub mod queue;
pub mod retention;
pub mod tenant;
pub mod webhook;

pub use access::*;
pub use benchmark::*;
pub use candidate::*;
pub use error::{AuthErrorCode, Error, Result, ValidationErrorCode};
pub use events::*;
pub use ids::*;
pub use queue::*;
pub use retention::*;
pub use tenant::*;
pub use webhook::*;
