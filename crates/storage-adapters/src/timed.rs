//! Deadline wrapper for any `AssetStorage`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domains::{AssetRef, AssetStorage, ResourceKind, UploadPayload, UploadSignature};
use tokio::time::timeout;

pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TimedStorage {
    inner: Arc<dyn AssetStorage>,
    limit: Duration,
}

impl TimedStorage {
    pub fn new(inner: Arc<dyn AssetStorage>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl AssetStorage for TimedStorage {
    async fn upload(&self, payload: UploadPayload, kind: ResourceKind) -> anyhow::Result<AssetRef> {
        timeout(self.limit, self.inner.upload(payload, kind))
            .await
            .map_err(|_| anyhow::anyhow!("storage upload timed out after {:?}", self.limit))?
    }

    async fn destroy(&self, storage_id: &str, kind: ResourceKind) -> anyhow::Result<()> {
        timeout(self.limit, self.inner.destroy(storage_id, kind))
            .await
            .map_err(|_| anyhow::anyhow!("storage destroy timed out after {:?}", self.limit))?
    }

    fn upload_signature(
        &self,
        folder: Option<String>,
        timestamp: i64,
    ) -> anyhow::Result<UploadSignature> {
        self.inner.upload_signature(folder, timestamp)
    }

    fn verify_upload_signature(&self, presented: &UploadSignature) -> bool {
        self.inner.verify_upload_signature(presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    #[async_trait]
    impl AssetStorage for Stalled {
        async fn upload(&self, _: UploadPayload, _: ResourceKind) -> anyhow::Result<AssetRef> {
            std::future::pending().await
        }

        async fn destroy(&self, _: &str, _: ResourceKind) -> anyhow::Result<()> {
            Ok(())
        }

        fn upload_signature(&self, _: Option<String>, _: i64) -> anyhow::Result<UploadSignature> {
            anyhow::bail!("unused")
        }

        fn verify_upload_signature(&self, _: &UploadSignature) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_upload_fails_at_the_deadline() {
        let storage = TimedStorage::new(Arc::new(Stalled), Duration::from_secs(30));
        let err = storage
            .upload(UploadPayload::new(vec![1u8]), ResourceKind::Image)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let storage = TimedStorage::new(Arc::new(Stalled), Duration::from_secs(30));
        storage.destroy("images/x.jpg", ResourceKind::Image).await.unwrap();
    }
}
