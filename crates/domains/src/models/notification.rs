use serde::Serialize;

use super::message::MessageStatus;

/// An email the lifecycle manager wants sent. Delivery is best-effort.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Acknowledgement to a first-time sender, carrying their opt-out link.
    AutoReply {
        to: String,
        name: String,
        message: String,
        block_url: String,
    },
    /// A brand new conversation for the site admin.
    AdminNewMessage {
        name: String,
        email: String,
        message: String,
    },
    /// A sender followed up on a conversation that had been answered.
    AdminFollowUp {
        name: String,
        email: String,
        message: String,
        previous_status: MessageStatus,
    },
}
