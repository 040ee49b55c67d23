//! Per-IP submission limiting.
//!
//! The limiter keeps no counters of its own. Every decision is a count of
//! stored messages, so several server processes sharing one store agree.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domains::{DomainError, MessageRepository, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Trailing window the count covers.
    pub window: Duration,
    /// Submissions allowed per window. `0` disables limiting.
    pub max_messages: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window: Duration::minutes(10),
            max_messages: 1,
        }
    }
}

pub struct RateLimiter {
    messages: Arc<dyn MessageRepository>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(messages: Arc<dyn MessageRepository>, policy: RateLimitPolicy) -> Self {
        Self { messages, policy }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Whether `ip` may create another message at `now`.
    pub async fn allow(&self, ip: &str, now: DateTime<Utc>) -> Result<bool> {
        if self.policy.max_messages == 0 {
            return Ok(true);
        }
        let since = now - self.policy.window;
        let recent = self
            .messages
            .count_from_ip_since(ip, since)
            .await
            .map_err(DomainError::store)?;
        Ok(recent < self.policy.max_messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::MockMessageRepository;
    use mockall::predicate::{always, eq};

    fn limiter(repo: MockMessageRepository, max_messages: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(repo),
            RateLimitPolicy {
                window: Duration::minutes(10),
                max_messages,
            },
        )
    }

    #[tokio::test]
    async fn counts_against_the_trailing_window() {
        let now = Utc::now();
        let mut repo = MockMessageRepository::new();
        repo.expect_count_from_ip_since()
            .with(eq("10.0.0.1"), eq(now - Duration::minutes(10)))
            .times(1)
            .returning(|_, _| Ok(0));

        assert!(limiter(repo, 1).allow("10.0.0.1", now).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_once_threshold_is_reached() {
        let mut repo = MockMessageRepository::new();
        repo.expect_count_from_ip_since()
            .with(always(), always())
            .returning(|_, _| Ok(3));

        let limiter = limiter(repo, 3);
        assert!(!limiter.allow("10.0.0.1", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn zero_threshold_skips_the_store() {
        let repo = MockMessageRepository::new();
        assert!(limiter(repo, 0).allow("10.0.0.1", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn store_failures_surface_as_store_errors() {
        let mut repo = MockMessageRepository::new();
        repo.expect_count_from_ip_since()
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));

        let err = limiter(repo, 1).allow("10.0.0.1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DomainError::Store(_)));
    }
}
