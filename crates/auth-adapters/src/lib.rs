//! # auth-adapters
//!
//! Signed timed tokens (HS256 JWTs), the opt-out link service built on them, and the
//! admin session gate. One process-wide secret feeds all of it; salts keep
//! the token kinds from being replayed as one another.

pub mod block_token;
pub mod session;
pub mod signer;

pub use block_token::{SignedBlockTokens, BLOCK_TOKEN_SALT};
pub use session::{hash_password, verify_password_hash, AdminCredentials, SessionManager, SESSION_SALT};
pub use signer::{SignerError, TimedSigner};
