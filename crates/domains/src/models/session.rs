use chrono::{DateTime, Utc};
use serde::Serialize;

/// Proof that the caller logged in as the site admin.
///
/// Admin service operations take a `&AdminSession`, so the gate must have run
/// before any data is touched. Only the session manager hands these out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminSession {
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AdminSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
