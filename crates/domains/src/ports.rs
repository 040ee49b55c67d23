//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be wired into the binary.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{
    AssetRef, EmailAddress, MediaAsset, MediaFilter, Message, MessageStatus, Notification,
    PageRequest, ResourceKind, UploadPayload, UploadSignature,
};

/// Explicit lifecycle of the persistence gateway.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// Cheap round trip proving the store can serve requests right now.
    async fn ping(&self) -> anyhow::Result<()>;
}

/// Data persistence contract for contact messages.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Messages created from `ip` at or after `since`.
    async fn count_from_ip_since(&self, ip: &str, since: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn find_by_email_and_status(
        &self,
        email: &str,
        status: &MessageStatus,
    ) -> anyhow::Result<Option<Message>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Message>>;

    /// Returns `false` when the store refused a second pending document for
    /// the same email.
    async fn insert(&self, message: Message) -> anyhow::Result<bool>;

    /// Replaces the body, reopens as pending and refreshes the timestamp, but
    /// only while the document is still `responded`. Returns whether it did.
    async fn reopen_with(&self, id: Uuid, body: &str, at: DateTime<Utc>) -> anyhow::Result<bool>;

    /// Returns `false` when no document matched or the status was unchanged.
    async fn set_status(&self, id: Uuid, status: &MessageStatus) -> anyhow::Result<bool>;

    /// Marks every document for `email` blocked; returns how many matched.
    async fn block_email(&self, email: &str) -> anyhow::Result<u64>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Newest activity first.
    async fn list(&self, page: PageRequest) -> anyhow::Result<Vec<Message>>;
}

/// Data persistence contract for gallery entries.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn insert(&self, asset: MediaAsset) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MediaAsset>>;

    /// Overwrites every mutable field; returns `false` if the id is unknown.
    async fn update(&self, asset: &MediaAsset) -> anyhow::Result<bool>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Newest first.
    async fn list(&self, filter: MediaFilter, page: PageRequest)
        -> anyhow::Result<Vec<MediaAsset>>;
}

/// Remote object storage for gallery files.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Stores the payload and returns its public URL and storage id.
    async fn upload(&self, payload: UploadPayload, kind: ResourceKind) -> anyhow::Result<AssetRef>;

    /// Releases a stored object. `kind` must match the upload.
    async fn destroy(&self, storage_id: &str, kind: ResourceKind) -> anyhow::Result<()>;

    /// Signs `{folder, timestamp}` with the provider credential so a client
    /// can upload straight to the provider.
    fn upload_signature(
        &self,
        folder: Option<String>,
        timestamp: i64,
    ) -> anyhow::Result<UploadSignature>;

    /// True when `presented` carries this provider's key and a signature
    /// that `upload_signature` would have produced. Age is not checked here.
    fn verify_upload_signature(&self, presented: &UploadSignature) -> bool;
}

/// Normalizes uploaded images before they reach storage.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageOptimizer: Send + Sync {
    async fn optimize(&self, raw: Bytes) -> anyhow::Result<Bytes>;
}

/// Self-contained, signed opt-out credentials.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait BlockTokens: Send + Sync {
    fn issue(&self, email: &EmailAddress, now: DateTime<Utc>) -> Result<String, DomainError>;

    /// Fails with [`DomainError::InvalidToken`] on a bad signature, a
    /// malformed payload, or a token older than `max_age`.
    fn verify(
        &self,
        token: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<EmailAddress, DomainError>;
}

/// Outbound email, fire-and-forget.
///
/// `notify` returns nothing on purpose: it must never block the caller and a
/// failed delivery never fails the operation that triggered it.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
