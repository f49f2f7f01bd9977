//! Shared entity types and error definitions for the daily betting pipeline.

pub mod error;
pub mod store;
pub mod types;

pub use error::Error;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
