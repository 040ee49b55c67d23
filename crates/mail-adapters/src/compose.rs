//! Turns a [`Notification`] into a ready-to-send HTML email.

use askama::Template;
use domains::Notification;
use serde::Serialize;

use crate::error::MailError;

#[derive(Template)]
#[template(path = "auto_reply.html")]
struct AutoReplyTemplate<'a> {
    name: &'a str,
    owner_name: &'a str,
    message: &'a str,
    block_url: &'a str,
}

#[derive(Template)]
#[template(path = "admin_notification.html")]
struct AdminNotificationTemplate<'a> {
    status: &'a str,
    status_class: &'a str,
    name: &'a str,
    email: &'a str,
    message: &'a str,
}

/// Addresses and names stamped onto every outgoing email.
#[derive(Debug, Clone)]
pub struct Letterhead {
    pub from: String,
    pub admin_address: String,
    pub owner_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub fn compose(notification: &Notification, letterhead: &Letterhead) -> Result<OutgoingMail, MailError> {
    let (to, subject, html) = match notification {
        Notification::AutoReply {
            to,
            name,
            message,
            block_url,
        } => (
            to.clone(),
            format!("Message Received - {}", letterhead.owner_name),
            AutoReplyTemplate {
                name,
                owner_name: &letterhead.owner_name,
                message,
                block_url,
            }
            .render()?,
        ),
        Notification::AdminNewMessage {
            name,
            email,
            message,
        } => (
            letterhead.admin_address.clone(),
            format!("Portfolio: New Message from {name}"),
            AdminNotificationTemplate {
                status: "NEW",
                status_class: "status-new",
                name,
                email,
                message,
            }
            .render()?,
        ),
        Notification::AdminFollowUp {
            name,
            email,
            message,
            ..
        } => (
            letterhead.admin_address.clone(),
            format!("Portfolio: Reply from {name}"),
            AdminNotificationTemplate {
                status: "RESPONDED (Updated)",
                status_class: "status-responded",
                name,
                email,
                message,
            }
            .render()?,
        ),
    };

    Ok(OutgoingMail {
        from: letterhead.from.clone(),
        to,
        subject,
        html,
    })
}
