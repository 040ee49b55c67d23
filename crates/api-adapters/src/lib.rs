//! # api-adapters
//!
//! HTTP surface of the portfolio backend. Handlers translate requests into
//! service calls and `DomainError`s into status codes; they hold no
//! business rules of their own.

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;
#[cfg(feature = "web-axum")]
pub mod router;

pub mod metrics;
pub mod state;

#[cfg(feature = "web-axum")]
pub use error::ApiError;
#[cfg(feature = "web-axum")]
pub use router::router;

pub use metrics::Metrics;
pub use state::{AppState, HttpSettings};
