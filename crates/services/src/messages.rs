//! # Message lifecycle
//!
//! A contact message is keyed by the sender's email and moves through
//! `pending -> responded -> pending -> ...` until it is blocked:
//!
//! | stored state | on submit                                  |
//! |--------------|--------------------------------------------|
//! | none         | create `pending`, auto-reply + admin email |
//! | `pending`    | `AlreadyPending`                           |
//! | `responded`  | append, reopen as `pending`, admin email   |
//! | `blocked`    | `Blocked`, forever                         |
//!
//! The rate limit is checked before any of that. The checks are reads
//! followed by writes without a transaction; the store's uniqueness guard on
//! pending documents (where it has one) catches the remaining race.

use std::sync::Arc;

use chrono::Duration;
use domains::{
    AdminSession, BlockTokens, Clock, DomainError, EmailAddress, Message, MessageRepository,
    MessageStatus, Notification, Notifier, Page, PageRequest, Result, Submission, SubmitOutcome,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone)]
pub struct MessageSettings {
    /// Public origin the opt-out link points at, e.g. `https://example.com`.
    pub public_url: String,
    /// How long an opt-out link stays valid.
    pub block_token_max_age: Duration,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:5000".to_string(),
            block_token_max_age: Duration::days(30),
        }
    }
}

pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    limiter: RateLimiter,
    tokens: Arc<dyn BlockTokens>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: MessageSettings,
}

impl MessageService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        limiter: RateLimiter,
        tokens: Arc<dyn BlockTokens>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: MessageSettings,
    ) -> Self {
        Self {
            messages,
            limiter,
            tokens,
            notifier,
            clock,
            settings,
        }
    }

    /// Validates raw request fields into a [`Submission`].
    pub fn validate(email: &str, name: &str, body: &str, ip: &str) -> Result<Submission> {
        if email.trim().is_empty() || body.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "email and message are required".to_string(),
            ));
        }
        Ok(Submission {
            email: EmailAddress::parse(email)?,
            name: name.trim().to_string(),
            body: body.to_string(),
            ip: ip.to_string(),
        })
    }

    /// Public contact intake.
    #[tracing::instrument(skip_all, fields(email = %submission.email, ip = %submission.ip))]
    pub async fn submit(&self, submission: Submission) -> Result<SubmitOutcome> {
        let now = self.clock.now();

        if !self.limiter.allow(&submission.ip, now).await? {
            info!("submission rate limited");
            return Err(DomainError::RateLimited);
        }

        let email = submission.email.as_str();

        if self.find(email, MessageStatus::Blocked).await?.is_some() {
            info!("submission from blocked sender rejected");
            return Err(DomainError::Blocked);
        }

        if self.find(email, MessageStatus::Pending).await?.is_some() {
            return Err(DomainError::AlreadyPending);
        }

        if let Some(answered) = self.find(email, MessageStatus::Responded).await? {
            let body = answered.appended_body(&submission.body);
            let reopened = self
                .messages
                .reopen_with(answered.id, &body, now)
                .await
                .map_err(DomainError::store)?;
            if !reopened {
                // Another request reopened it between our read and write.
                return Err(DomainError::AlreadyPending);
            }

            info!(message_id = %answered.id, "follow-up appended to responded message");
            self.notifier.notify(Notification::AdminFollowUp {
                name: submission.name,
                email: email.to_string(),
                message: submission.body,
                previous_status: answered.status,
            });
            return Ok(SubmitOutcome::Appended(answered.id));
        }

        let message = Message::pending(
            &submission.email,
            submission.name.clone(),
            submission.body.clone(),
            submission.ip.clone(),
            now,
        );
        let id = message.id;
        let inserted = self
            .messages
            .insert(message)
            .await
            .map_err(DomainError::store)?;
        if !inserted {
            return Err(DomainError::AlreadyPending);
        }
        info!(message_id = %id, "new message stored");

        let token = self.tokens.issue(&submission.email, now)?;
        self.notifier.notify(Notification::AutoReply {
            to: email.to_string(),
            name: submission.name.clone(),
            message: submission.body.clone(),
            block_url: self.block_url(&token),
        });
        self.notifier.notify(Notification::AdminNewMessage {
            name: submission.name,
            email: email.to_string(),
            message: submission.body,
        });

        Ok(SubmitOutcome::Created(id))
    }

    /// Sets any status label on a message.
    ///
    /// Reports `NotFound` when nothing changed, including a repeat of the
    /// current status.
    #[tracing::instrument(skip(self, _admin))]
    pub async fn respond_to(&self, _admin: &AdminSession, id: Uuid, status: &str) -> Result<()> {
        let status = status.trim();
        if status.is_empty() {
            return Err(DomainError::InvalidInput("status is required".to_string()));
        }
        let status: MessageStatus = status.to_string().into();

        let changed = self
            .messages
            .set_status(id, &status)
            .await
            .map_err(DomainError::store)?;
        if !changed {
            return Err(DomainError::not_found("message"));
        }
        info!(%status, "message status updated");
        Ok(())
    }

    /// Self-service opt-out from the link in the auto-reply.
    ///
    /// Succeeds every time the token verifies, whether or not anything is
    /// stored for the address.
    #[tracing::instrument(skip_all)]
    pub async fn block_by_token(&self, token: &str) -> Result<EmailAddress> {
        let now = self.clock.now();
        let email = self
            .tokens
            .verify(token, self.settings.block_token_max_age, now)?;
        self.block_email(&email).await?;
        Ok(email)
    }

    /// Admin block of the sender behind a message.
    #[tracing::instrument(skip(self, _admin))]
    pub async fn block_message(&self, _admin: &AdminSession, id: Uuid) -> Result<EmailAddress> {
        let message = self
            .messages
            .find_by_id(id)
            .await
            .map_err(DomainError::store)?
            .ok_or_else(|| DomainError::not_found("message"))?;
        let email = EmailAddress::parse(&message.email)?;
        self.block_email(&email).await?;
        Ok(email)
    }

    #[tracing::instrument(skip(self, _admin))]
    pub async fn delete(&self, _admin: &AdminSession, id: Uuid) -> Result<()> {
        let deleted = self.messages.delete(id).await.map_err(DomainError::store)?;
        if !deleted {
            return Err(DomainError::not_found("message"));
        }
        info!("message deleted");
        Ok(())
    }

    pub async fn list(&self, _admin: &AdminSession, page: PageRequest) -> Result<Page<Message>> {
        let data = self.messages.list(page).await.map_err(DomainError::store)?;
        Ok(Page::new(page, data))
    }

    async fn block_email(&self, email: &EmailAddress) -> Result<()> {
        let matched = self
            .messages
            .block_email(email.as_str())
            .await
            .map_err(DomainError::store)?;

        if matched == 0 {
            let marker = Message::blocked_marker(email, self.clock.now());
            let inserted = self
                .messages
                .insert(marker)
                .await
                .map_err(DomainError::store)?;
            if !inserted {
                warn!(%email, "block marker insert was refused");
            }
        }
        info!(%email, matched, "sender blocked");
        Ok(())
    }

    async fn find(&self, email: &str, status: MessageStatus) -> Result<Option<Message>> {
        self.messages
            .find_by_email_and_status(email, &status)
            .await
            .map_err(DomainError::store)
    }

    fn block_url(&self, token: &str) -> String {
        format!(
            "{}/block_user/{}",
            self.settings.public_url.trim_end_matches('/'),
            token
        )
    }
}
