//! # In-memory store
//!
//! `DashMap`-backed implementation of every persistence port. Used by the
//! test suites and by the binary when built without `db-postgres`.
//!
//! Mirrors the Postgres gateway's guarantee: a second `pending` document
//! for one email is refused, enforced through a per-email index whose
//! `entry` API makes the check-and-claim atomic.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::{
    MediaAsset, MediaFilter, MediaRepository, Message, MessageRepository, MessageStatus,
    PageRequest, StoreHealth,
};
use uuid::Uuid;

#[derive(Debug)]
pub struct InMemoryStore {
    messages: DashMap<Uuid, Message>,
    /// email -> id of its pending message
    pending: DashMap<String, Uuid>,
    media: DashMap<Uuid, MediaAsset>,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            messages: DashMap::new(),
            pending: DashMap::new(),
            media: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: `ping` fails until switched back on.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn messages_for(&self, email: &str) -> Vec<Message> {
        let mut found: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.email == email)
            .map(|m| m.value().clone())
            .collect();
        found.sort_by_key(|m| m.created_at);
        found
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn media_count(&self) -> usize {
        self.media.len()
    }

    fn claim_pending(&self, email: &str, id: Uuid) -> bool {
        match self.pending.entry(email.to_string()) {
            Entry::Occupied(existing) => *existing.get() == id,
            Entry::Vacant(slot) => {
                slot.insert(id);
                true
            }
        }
    }

    fn release_pending(&self, email: &str, id: Uuid) {
        self.pending.remove_if(email, |_, owner| *owner == id);
    }
}

fn newest_first<T>(mut items: Vec<T>, key: impl Fn(&T) -> (DateTime<Utc>, Uuid), page: PageRequest) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    async fn ping(&self) -> anyhow::Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            anyhow::bail!("in-memory store switched off")
        }
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn count_from_ip_since(&self, ip: &str, since: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.ip.as_deref() == Some(ip) && m.created_at >= since)
            .count() as u64)
    }

    async fn find_by_email_and_status(
        &self,
        email: &str,
        status: &MessageStatus,
    ) -> anyhow::Result<Option<Message>> {
        Ok(self
            .messages
            .iter()
            .find(|m| m.email == email && &m.status == status)
            .map(|m| m.value().clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Message>> {
        Ok(self.messages.get(&id).map(|m| m.value().clone()))
    }

    async fn insert(&self, message: Message) -> anyhow::Result<bool> {
        if message.status == MessageStatus::Pending && !self.claim_pending(&message.email, message.id) {
            return Ok(false);
        }
        self.messages.insert(message.id, message);
        Ok(true)
    }

    async fn reopen_with(&self, id: Uuid, body: &str, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let Some(mut message) = self.messages.get_mut(&id) else {
            return Ok(false);
        };
        if message.status != MessageStatus::Responded || !self.claim_pending(&message.email, id) {
            return Ok(false);
        }
        message.body = body.to_string();
        message.status = MessageStatus::Pending;
        message.created_at = at;
        Ok(true)
    }

    async fn set_status(&self, id: Uuid, status: &MessageStatus) -> anyhow::Result<bool> {
        let Some(mut message) = self.messages.get_mut(&id) else {
            return Ok(false);
        };
        if &message.status == status {
            return Ok(false);
        }
        if *status == MessageStatus::Pending && !self.claim_pending(&message.email, id) {
            return Ok(false);
        }
        if message.status == MessageStatus::Pending {
            self.release_pending(&message.email, id);
        }
        message.status = status.clone();
        Ok(true)
    }

    async fn block_email(&self, email: &str) -> anyhow::Result<u64> {
        let mut matched = 0;
        for mut message in self.messages.iter_mut().filter(|m| m.email == email) {
            message.status = MessageStatus::Blocked;
            matched += 1;
        }
        self.pending.remove(email);
        Ok(matched)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        match self.messages.remove(&id) {
            Some((_, message)) => {
                self.release_pending(&message.email, id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, page: PageRequest) -> anyhow::Result<Vec<Message>> {
        let all = self.messages.iter().map(|m| m.value().clone()).collect();
        Ok(newest_first(all, |m| (m.created_at, m.id), page))
    }
}

#[async_trait]
impl MediaRepository for InMemoryStore {
    async fn insert(&self, asset: MediaAsset) -> anyhow::Result<()> {
        self.media.insert(asset.id, asset);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MediaAsset>> {
        Ok(self.media.get(&id).map(|m| m.value().clone()))
    }

    async fn update(&self, asset: &MediaAsset) -> anyhow::Result<bool> {
        match self.media.get_mut(&asset.id) {
            Some(mut stored) => {
                *stored = asset.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.media.remove(&id).is_some())
    }

    async fn list(&self, filter: MediaFilter, page: PageRequest) -> anyhow::Result<Vec<MediaAsset>> {
        let all = self
            .media
            .iter()
            .filter(|m| match filter {
                MediaFilter::All => true,
                MediaFilter::Only(kind) => m.kind == kind,
            })
            .map(|m| m.value().clone())
            .collect();
        Ok(newest_first(all, |m| (m.created_at, m.id), page))
    }
}
