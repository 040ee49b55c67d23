//! # storage-adapters
//!
//! Persistence and object-storage implementations of the domain ports.
//! The in-memory store and the image optimizer are always compiled; the
//! Postgres gateway and local asset storage sit behind features.

pub mod memory;
pub mod optimizer;
pub mod timed;

#[cfg(feature = "db-postgres")]
pub mod postgres;

#[cfg(feature = "media-local")]
pub mod local;

pub use memory::InMemoryStore;
pub use optimizer::{optimize_image, JpegOptimizer, JPEG_QUALITY, MAX_DIMENSION};
pub use timed::{TimedStorage, DEFAULT_STORAGE_TIMEOUT};

#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;

#[cfg(feature = "media-local")]
pub use local::LocalAssetStorage;
