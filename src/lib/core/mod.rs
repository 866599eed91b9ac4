//! Shared infrastructure: error taxonomy, log-space numerics and thread
//! pool management.

pub mod concurrency;
pub mod errors;
pub mod maths;

pub use errors::{CallerError, Result};
