//! # DomainError
//!
//! Centralized error handling for the portfolio backend.
//! Maps lifecycle and abuse-control failures to actionable error types.

use thiserror::Error;

/// The primary error type for all service operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed or missing fields, bad email syntax.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A media request lacks a required field or payload.
    #[error("incomplete input: {0}")]
    IncompleteInput(String),

    /// Too many submissions from one IP inside the window.
    #[error("too many messages sent, please try again later")]
    RateLimited,

    /// The sender opted out of all further contact.
    #[error("you have blocked emails from us, no message sent")]
    Blocked,

    /// A previous message from the same sender awaits a response.
    #[error("you have a pending message, please wait for a response")]
    AlreadyPending,

    /// Resource not found (e.g., Message, MediaAsset)
    #[error("{0} not found")]
    NotFound(String),

    /// Block link signature, payload, or age rejected.
    #[error("invalid or expired link")]
    InvalidToken,

    /// Admin-only operation attempted without a session.
    #[error("unauthorized access")]
    Unauthorized,

    /// Login attempt with credentials that do not match.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The persistence gateway failed its health check.
    #[error("database unavailable, please refresh")]
    StoreUnavailable,

    /// The persistence gateway failed mid-operation.
    #[error("store failure: {0}")]
    Store(#[source] anyhow::Error),

    /// Object storage or another remote collaborator failed.
    #[error("upstream failure: {0}")]
    Upstream(#[source] anyhow::Error),
}

impl DomainError {
    pub fn store(err: anyhow::Error) -> Self {
        Self::Store(err)
    }

    pub fn upstream(err: anyhow::Error) -> Self {
        Self::Upstream(err)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// A specialized Result type for portfolio service logic.
pub type Result<T> = std::result::Result<T, DomainError>;
