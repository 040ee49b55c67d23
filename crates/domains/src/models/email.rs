use std::fmt;

use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::error::DomainError;

/// A syntactically valid, trimmed and lowercased email address.
///
/// Lowercasing makes the address usable as the conversation key: `A@X.com`
/// and `a@x.com` resolve to the same thread. Only plain `local@domain.tld`
/// forms pass, so an address can go into a `To:` header as is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let candidate = raw.trim();
        if !candidate.validate_email() {
            return Err(invalid(raw));
        }

        // Dotted hostnames only: no bare `localhost`, no `[1.2.3.4]` literals.
        let (_, domain) = candidate.rsplit_once('@').ok_or_else(|| invalid(raw))?;
        let label_ok = |label: &str| {
            !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        };
        let dotted = domain.split('.').count() >= 2 && domain.split('.').all(label_ok);
        if !dotted {
            return Err(invalid(raw));
        }

        Ok(Self(candidate.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn invalid(raw: &str) -> DomainError {
    DomainError::InvalidInput(format!("'{}' is not a valid email address", raw.trim()))
}

impl TryFrom<String> for EmailAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
