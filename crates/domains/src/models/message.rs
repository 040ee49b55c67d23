use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::email::EmailAddress;

/// Joins a sender's follow-up onto the stored conversation body.
pub const MESSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Where a conversation stands.
///
/// The admin "respond" operation stores arbitrary labels, so anything that is
/// not one of the three lifecycle states is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageStatus {
    Pending,
    Responded,
    Blocked,
    Other(String),
}

impl MessageStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
            Self::Blocked => "blocked",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for MessageStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => Self::Pending,
            "responded" => Self::Responded,
            "blocked" => Self::Blocked,
            _ => Self::Other(value),
        }
    }
}

impl From<MessageStatus> for String {
    fn from(value: MessageStatus) -> Self {
        match value {
            MessageStatus::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for MessageStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sender's conversation thread, keyed by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Every segment the sender wrote, joined by [`MESSAGE_SEPARATOR`].
    #[serde(rename = "message")]
    pub body: String,
    pub status: MessageStatus,
    /// Origin IP of the first submission; absent on block markers.
    pub ip: Option<String>,
    /// Creation time, refreshed whenever the sender appends.
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn pending(
        email: &EmailAddress,
        name: impl Into<String>,
        body: impl Into<String>,
        ip: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            email: email.to_string(),
            body: body.into(),
            status: MessageStatus::Pending,
            ip: Some(ip.into()),
            created_at: now,
        }
    }

    /// Minimal document recording an opt-out for an email with no history.
    pub fn blocked_marker(email: &EmailAddress, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: String::new(),
            email: email.to_string(),
            body: String::new(),
            status: MessageStatus::Blocked,
            ip: None,
            created_at: now,
        }
    }

    /// The body as it reads after the sender adds `text`.
    pub fn appended_body(&self, text: &str) -> String {
        format!("{}{}{}", self.body, MESSAGE_SEPARATOR, text)
    }
}

/// Validated input for a public contact submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub email: EmailAddress,
    pub name: String,
    pub body: String,
    pub ip: String,
}

/// What a successful submission did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(Uuid),
    Appended(Uuid),
}

impl SubmitOutcome {
    pub fn message_id(&self) -> Uuid {
        match self {
            Self::Created(id) | Self::Appended(id) => *id,
        }
    }
}
