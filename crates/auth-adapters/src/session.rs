//! # Admin sessions
//!
//! Server-side session table keyed by a random id. The browser only holds a
//! signed copy of that id in a cookie; logging out removes the row, so a
//! copied cookie stops working immediately.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use domains::{AdminSession, DomainError};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::signer::TimedSigner;

/// Namespace keeping session cookies apart from block tokens.
pub const SESSION_SALT: &str = "admin-session";

/// The single admin account, as configured.
pub struct AdminCredentials {
    pub email: String,
    /// Plain text, or an Argon2 PHC string (`$argon2id$...`).
    pub password: SecretString,
}

pub struct SessionManager {
    credentials: AdminCredentials,
    signer: TimedSigner,
    sessions: DashMap<Uuid, AdminSession>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(secret: &[u8], credentials: AdminCredentials, ttl: Duration) -> Self {
        Self {
            credentials,
            signer: TimedSigner::new(secret, SESSION_SALT),
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Checks the credentials and opens a session.
    ///
    /// Returns the cookie value to hand to the browser.
    pub fn login(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, AdminSession), DomainError> {
        let email_ok = email
            .trim()
            .eq_ignore_ascii_case(self.credentials.email.trim());
        let password_ok = self.password_matches(password);
        if !(email_ok && password_ok) {
            warn!("admin login rejected");
            return Err(DomainError::InvalidCredentials);
        }

        let id = Uuid::new_v4();
        let session = AdminSession {
            email: self.credentials.email.clone(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        let cookie = self.signer.sign(&id.to_string(), now).map_err(|err| {
            DomainError::upstream(anyhow::anyhow!(err))
        })?;
        self.sessions.insert(id, session.clone());
        info!("admin logged in");
        Ok((cookie, session))
    }

    /// Resolves a cookie value to a live session.
    pub fn authenticate(&self, cookie: &str, now: DateTime<Utc>) -> Result<AdminSession, DomainError> {
        let id = self.session_id(cookie, now).ok_or(DomainError::Unauthorized)?;

        let session = self
            .sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(DomainError::Unauthorized)?;
        if session.is_expired(now) {
            self.sessions.remove(&id);
            return Err(DomainError::Unauthorized);
        }
        Ok(session)
    }

    /// Ends the session behind `cookie`, if there is one.
    pub fn logout(&self, cookie: &str, now: DateTime<Utc>) {
        if let Some(id) = self.session_id(cookie, now) {
            if self.sessions.remove(&id).is_some() {
                info!("admin logged out");
            }
        }
    }

    /// Drops expired rows; returns how many went.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        before - self.sessions.len()
    }

    fn session_id(&self, cookie: &str, now: DateTime<Utc>) -> Option<Uuid> {
        match self.signer.unsign(cookie, self.ttl, now) {
            Ok(raw) => raw.parse().ok(),
            Err(err) => {
                debug!(error = %err, "session cookie rejected");
                None
            }
        }
    }

    fn password_matches(&self, candidate: &str) -> bool {
        let expected = self.credentials.password.expose_secret();
        if expected.starts_with("$argon2") {
            return verify_password_hash(candidate, expected);
        }
        bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
    }
}

/// Verifies a password against a stored Argon2 PHC string.
pub fn verify_password_hash(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Produces an Argon2id PHC string suitable for the admin password setting.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())?;
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}
