//! The central domain model and port definitions for the portfolio backend.
//!
//! Nothing in here performs I/O. Services depend on the traits in [`ports`];
//! adapter crates implement them.

pub mod error;
pub mod models;
pub mod ports;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use ports::*;
