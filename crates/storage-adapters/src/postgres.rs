//! # Postgres gateway
//!
//! Maps the relational model onto the domain models. Queries are built at
//! runtime so the crate compiles without a live database.
//!
//! The partial unique index `messages_one_pending_per_email` is the source of
//! truth for "one pending conversation per sender"; a violation is reported
//! back as `false`, never as an error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AssetRef, MediaAsset, MediaFilter, MediaKind, MediaRepository, Message, MessageRepository,
    MessageStatus, PageRequest, StoreHealth,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32, timeout: Duration) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("migrations applied");
        Ok(())
    }
}

/// Turns a unique violation into `Ok(false)`, anything else into an error.
fn affected_or_conflict(result: Result<sqlx::postgres::PgQueryResult, sqlx::Error>) -> anyhow::Result<bool> {
    match result {
        Ok(done) => Ok(done.rows_affected() > 0),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn message_from_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    Ok(Message {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        body: row.try_get("message")?,
        status: MessageStatus::from(row.try_get::<String, _>("status")?),
        ip: row.try_get("ip")?,
        created_at: row.try_get("created_at")?,
    })
}

fn media_from_row(row: &PgRow) -> anyhow::Result<MediaAsset> {
    let kind: String = row.try_get("kind")?;
    let poster_url: Option<String> = row.try_get("poster_url")?;
    let poster_storage_id: Option<String> = row.try_get("poster_storage_id")?;
    Ok(MediaAsset {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        kind: kind.parse::<MediaKind>()?,
        description: row.try_get("description")?,
        skills: row.try_get("skills")?,
        asset: AssetRef {
            url: row.try_get("url")?,
            storage_id: row.try_get("storage_id")?,
        },
        poster: poster_url
            .zip(poster_storage_id)
            .map(|(url, storage_id)| AssetRef { url, storage_id }),
        created_at: row.try_get("created_at")?,
    })
}

const MESSAGE_COLUMNS: &str = "id, name, email, message, status, ip, created_at";
const MEDIA_COLUMNS: &str =
    "id, title, kind, description, skills, url, storage_id, poster_url, poster_storage_id, created_at";

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn count_from_ip_since(&self, ip: &str, since: DateTime<Utc>) -> anyhow::Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE ip = $1 AND created_at >= $2")
                .bind(ip)
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_email_and_status(
        &self,
        email: &str,
        status: &MessageStatus,
    ) -> anyhow::Result<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE email = $1 AND status = $2 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(email)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(message_from_row).transpose()?)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Message>> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(message_from_row).transpose()?)
    }

    #[instrument(skip(self, message), fields(id = %message.id))]
    async fn insert(&self, message: Message) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO messages (id, name, email, message, status, ip, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(&message.name)
        .bind(&message.email)
        .bind(&message.body)
        .bind(message.status.as_str())
        .bind(&message.ip)
        .bind(message.created_at)
        .execute(&self.pool)
        .await;
        affected_or_conflict(result)
    }

    async fn reopen_with(&self, id: Uuid, body: &str, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE messages SET message = $2, status = 'pending', created_at = $3 \
             WHERE id = $1 AND status = 'responded'",
        )
        .bind(id)
        .bind(body)
        .bind(at)
        .execute(&self.pool)
        .await;
        affected_or_conflict(result)
    }

    async fn set_status(&self, id: Uuid, status: &MessageStatus) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE messages SET status = $2 WHERE id = $1 AND status <> $2")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await;
        affected_or_conflict(result)
    }

    async fn block_email(&self, email: &str) -> anyhow::Result<u64> {
        let done = sqlx::query("UPDATE messages SET status = 'blocked' WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let done = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list(&self, page: PageRequest) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(message_from_row).collect::<Result<_, _>>()?)
    }
}

#[async_trait]
impl MediaRepository for PgStore {
    #[instrument(skip(self, asset), fields(id = %asset.id, kind = %asset.kind))]
    async fn insert(&self, asset: MediaAsset) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO media (id, title, kind, description, skills, url, storage_id, \
             poster_url, poster_storage_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(asset.id)
        .bind(&asset.title)
        .bind(asset.kind.as_str())
        .bind(&asset.description)
        .bind(&asset.skills)
        .bind(&asset.asset.url)
        .bind(&asset.asset.storage_id)
        .bind(asset.poster.as_ref().map(|p| p.url.clone()))
        .bind(asset.poster.as_ref().map(|p| p.storage_id.clone()))
        .bind(asset.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MediaAsset>> {
        let row = sqlx::query(&format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(media_from_row).transpose()
    }

    async fn update(&self, asset: &MediaAsset) -> anyhow::Result<bool> {
        let done = sqlx::query(
            "UPDATE media SET title = $2, description = $3, skills = $4, \
             poster_url = $5, poster_storage_id = $6 WHERE id = $1",
        )
        .bind(asset.id)
        .bind(&asset.title)
        .bind(&asset.description)
        .bind(&asset.skills)
        .bind(asset.poster.as_ref().map(|p| p.url.clone()))
        .bind(asset.poster.as_ref().map(|p| p.storage_id.clone()))
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let done = sqlx::query("DELETE FROM media WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list(&self, filter: MediaFilter, page: PageRequest) -> anyhow::Result<Vec<MediaAsset>> {
        let kind = match filter {
            MediaFilter::All => None,
            MediaFilter::Only(kind) => Some(kind.as_str()),
        };
        let rows = sqlx::query(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE ($1::text IS NULL OR kind = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(kind)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(media_from_row).collect()
    }
}
