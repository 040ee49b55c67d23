//! # Media asset lifecycle
//!
//! Every remote object (primary file or poster) belongs to exactly one
//! gallery entry. Replacing or deleting an entry releases its objects once,
//! and only after whatever replaces them is safely stored.

use std::sync::Arc;

use domains::{
    normalize_skills, AdminSession, AssetRef, AssetStorage, Clock, DomainError, ImageOptimizer,
    MediaAsset, MediaEdit, MediaFilter, MediaKind, MediaRepository, MediaSource, NewMedia, Page,
    PageRequest, ResourceKind, Result, UploadPayload, UploadSignature,
};
use tracing::{info, warn};
use uuid::Uuid;

/// How long a minted direct-upload credential stays usable.
pub const SIGNED_UPLOAD_MAX_AGE_SECS: i64 = 60 * 60;
/// Tolerated clock difference for credentials stamped slightly ahead.
const SIGNED_UPLOAD_SKEW_SECS: i64 = 60;

pub struct MediaService {
    media: Arc<dyn MediaRepository>,
    storage: Arc<dyn AssetStorage>,
    optimizer: Arc<dyn ImageOptimizer>,
    clock: Arc<dyn Clock>,
}

impl MediaService {
    pub fn new(
        media: Arc<dyn MediaRepository>,
        storage: Arc<dyn AssetStorage>,
        optimizer: Arc<dyn ImageOptimizer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            media,
            storage,
            optimizer,
            clock,
        }
    }

    /// Public gallery listing, newest first.
    pub async fn list(&self, filter: MediaFilter, page: PageRequest) -> Result<Page<MediaAsset>> {
        let data = self
            .media
            .list(filter, page)
            .await
            .map_err(DomainError::store)?;
        Ok(Page::new(page, data))
    }

    #[tracing::instrument(skip_all, fields(kind = %new.kind, title = %new.title))]
    pub async fn create(&self, _admin: &AdminSession, new: NewMedia) -> Result<MediaAsset> {
        let title = required(&new.title, "title")?;
        let description = required(&new.description, "description")?;
        let skills = normalize_skills(&new.skills);
        if skills.is_empty() {
            return Err(DomainError::IncompleteInput(
                "at least one skill is required".to_string(),
            ));
        }
        let source = new
            .source
            .ok_or_else(|| DomainError::IncompleteInput("no file uploaded".to_string()))?;

        let (asset, poster) = match (new.kind, source) {
            (MediaKind::Photo, MediaSource::Upload { file, poster }) => {
                if poster.is_some() {
                    return Err(DomainError::InvalidInput(
                        "posters are only accepted for videos".to_string(),
                    ));
                }
                let file = non_empty(file)?;
                (self.store_image(file).await?, None)
            }
            (MediaKind::Photo, MediaSource::Direct { .. }) => {
                return Err(DomainError::IncompleteInput(
                    "photos must be uploaded as a file".to_string(),
                ));
            }
            (MediaKind::Video, MediaSource::Direct { asset, poster }) => {
                (checked_ref(asset, "url")?, poster.map(|p| checked_ref(p, "poster url")).transpose()?)
            }
            (MediaKind::Video, MediaSource::Upload { file, poster }) => {
                let file = non_empty(file)?;
                let video = self
                    .storage
                    .upload(file, ResourceKind::Video)
                    .await
                    .map_err(DomainError::upstream)?;
                let poster = match poster.filter(|p| !p.is_empty()) {
                    Some(poster) => match self.store_image(poster).await {
                        Ok(stored) => Some(stored),
                        Err(err) => {
                            self.release(&video, ResourceKind::Video).await;
                            return Err(err);
                        }
                    },
                    None => None,
                };
                (video, poster)
            }
        };

        let entry = MediaAsset {
            id: Uuid::now_v7(),
            title,
            kind: new.kind,
            description,
            skills,
            asset,
            poster,
            created_at: self.clock.now(),
        };

        if let Err(err) = self.media.insert(entry.clone()).await {
            // Nothing references the uploads now; give them back.
            self.release_all(&entry).await;
            return Err(DomainError::store(err));
        }

        info!(media_id = %entry.id, "media created");
        Ok(entry)
    }

    #[tracing::instrument(skip(self, _admin, edit))]
    pub async fn edit(&self, _admin: &AdminSession, id: Uuid, edit: MediaEdit) -> Result<MediaAsset> {
        let mut entry = self.find(id).await?;

        if let Some(title) = &edit.title {
            entry.title = required(title, "title")?;
        }
        if let Some(description) = &edit.description {
            entry.description = required(description, "description")?;
        }
        if let Some(skills) = &edit.skills {
            let skills = normalize_skills(skills);
            if skills.is_empty() {
                return Err(DomainError::IncompleteInput(
                    "at least one skill is required".to_string(),
                ));
            }
            entry.skills = skills;
        }

        let mut replaced_poster = None;
        if let Some(poster) = edit.poster.filter(|p| !p.is_empty()) {
            if entry.kind != MediaKind::Video {
                return Err(DomainError::InvalidInput(
                    "posters are only accepted for videos".to_string(),
                ));
            }
            let fresh = self.store_image(poster).await?;
            replaced_poster = entry.poster.replace(fresh);
        }

        let updated = match self.media.update(&entry).await {
            Ok(updated) => updated,
            Err(err) => {
                self.discard_new_poster(&entry, replaced_poster.is_some()).await;
                return Err(DomainError::store(err));
            }
        };
        if !updated {
            self.discard_new_poster(&entry, replaced_poster.is_some()).await;
            return Err(DomainError::not_found("media"));
        }

        if let Some(old) = replaced_poster {
            self.release(&old, ResourceKind::Image).await;
        }

        info!(media_id = %entry.id, "media updated");
        Ok(entry)
    }

    /// Removes the entry whatever happens to its remote objects.
    #[tracing::instrument(skip(self, _admin))]
    pub async fn delete(&self, _admin: &AdminSession, id: Uuid) -> Result<()> {
        let entry = self.find(id).await?;
        self.release_all(&entry).await;

        let deleted = self.media.delete(id).await.map_err(DomainError::store)?;
        if !deleted {
            warn!(media_id = %id, "media document vanished before delete");
        }
        info!(media_id = %id, "media deleted");
        Ok(())
    }

    /// Mints a direct-upload credential for the admin frontend.
    pub fn upload_signature(
        &self,
        _admin: &AdminSession,
        folder: Option<String>,
    ) -> Result<UploadSignature> {
        let folder = folder.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
        self.storage
            .upload_signature(folder, self.clock.now().timestamp())
            .map_err(DomainError::upstream)
    }

    /// Stores a client-side upload that carries a credential from
    /// [`Self::upload_signature`]. No gallery entry is made; the client
    /// posts the returned reference as a direct descriptor afterwards.
    #[tracing::instrument(skip(self, presented, file), fields(kind = kind.as_str()))]
    pub async fn accept_signed_upload(
        &self,
        presented: &UploadSignature,
        kind: ResourceKind,
        file: UploadPayload,
    ) -> Result<AssetRef> {
        if !self.storage.verify_upload_signature(presented) {
            warn!("direct upload with a bad signature refused");
            return Err(DomainError::Unauthorized);
        }
        let age = self.clock.now().timestamp() - presented.timestamp;
        if !(-SIGNED_UPLOAD_SKEW_SECS..=SIGNED_UPLOAD_MAX_AGE_SECS).contains(&age) {
            warn!(age_secs = age, "direct upload with a stale signature refused");
            return Err(DomainError::Unauthorized);
        }

        let file = non_empty(file)?;
        let stored = self
            .storage
            .upload(file, kind)
            .await
            .map_err(DomainError::upstream)?;
        info!(storage_id = %stored.storage_id, "direct upload stored");
        Ok(stored)
    }

    async fn find(&self, id: Uuid) -> Result<MediaAsset> {
        self.media
            .find_by_id(id)
            .await
            .map_err(DomainError::store)?
            .ok_or_else(|| DomainError::not_found("media"))
    }

    async fn store_image(&self, payload: UploadPayload) -> Result<AssetRef> {
        let optimized = self
            .optimizer
            .optimize(payload.bytes)
            .await
            .map_err(|err| DomainError::InvalidInput(format!("unreadable image: {err}")))?;
        let payload = UploadPayload {
            bytes: optimized,
            file_name: payload.file_name,
            content_type: Some(mime::IMAGE_JPEG),
        };
        self.storage
            .upload(payload, ResourceKind::Image)
            .await
            .map_err(DomainError::upstream)
    }

    async fn release_all(&self, entry: &MediaAsset) {
        self.release(&entry.asset, entry.kind.resource_kind()).await;
        if let Some(poster) = &entry.poster {
            self.release(poster, ResourceKind::Image).await;
        }
    }

    async fn discard_new_poster(&self, entry: &MediaAsset, uploaded: bool) {
        if let (true, Some(poster)) = (uploaded, &entry.poster) {
            self.release(poster, ResourceKind::Image).await;
        }
    }

    /// Best-effort destroy; failures are logged, never returned.
    async fn release(&self, asset: &AssetRef, kind: ResourceKind) {
        if let Err(err) = self.storage.destroy(&asset.storage_id, kind).await {
            warn!(
                storage_id = %asset.storage_id,
                kind = kind.as_str(),
                error = %err,
                "failed to destroy remote asset"
            );
        }
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::IncompleteInput(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn non_empty(payload: UploadPayload) -> Result<UploadPayload> {
    if payload.is_empty() {
        return Err(DomainError::IncompleteInput("no file uploaded".to_string()));
    }
    Ok(payload)
}

fn checked_ref(asset: AssetRef, field: &str) -> Result<AssetRef> {
    if asset.url.trim().is_empty() || asset.storage_id.trim().is_empty() {
        return Err(DomainError::IncompleteInput(format!(
            "{field} and its storage id are required"
        )));
    }
    Ok(asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{Duration, Utc};
    use domains::testing::ManualClock;
    use domains::{MockAssetStorage, MockImageOptimizer, MockMediaRepository};
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn admin() -> AdminSession {
        let now = Utc::now();
        AdminSession {
            email: "admin@folio.test".into(),
            issued_at: now,
            expires_at: now + Duration::hours(1),
        }
    }

    fn service(
        repo: MockMediaRepository,
        storage: MockAssetStorage,
        optimizer: MockImageOptimizer,
    ) -> MediaService {
        MediaService::new(
            Arc::new(repo),
            Arc::new(storage),
            Arc::new(optimizer),
            Arc::new(ManualClock::default()),
        )
    }

    fn passthrough_optimizer() -> MockImageOptimizer {
        let mut optimizer = MockImageOptimizer::new();
        optimizer.expect_optimize().returning(|raw| Ok(raw));
        optimizer
    }

    fn video_entry(poster: Option<AssetRef>) -> MediaAsset {
        MediaAsset {
            id: Uuid::now_v7(),
            title: "Demo".into(),
            kind: MediaKind::Video,
            description: "A demo reel".into(),
            skills: vec!["rust".into()],
            asset: AssetRef {
                url: "https://cdn.test/v/1.mp4".into(),
                storage_id: "videos/1".into(),
            },
            poster,
            created_at: Utc::now(),
        }
    }

    fn new_media(kind: MediaKind, source: Option<MediaSource>) -> NewMedia {
        NewMedia {
            kind,
            title: " Sunset ".into(),
            description: "Golden hour".into(),
            skills: vec!["photography".into(), " ".into(), "photography".into()],
            source,
        }
    }

    #[tokio::test]
    async fn photo_upload_is_optimized_then_stored_as_image() {
        let mut optimizer = MockImageOptimizer::new();
        optimizer
            .expect_optimize()
            .with(eq(Bytes::from_static(b"raw")))
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"jpeg")));

        let mut storage = MockAssetStorage::new();
        storage
            .expect_upload()
            .withf(|p, kind| p.bytes.as_ref() == b"jpeg" && *kind == ResourceKind::Image)
            .times(1)
            .returning(|_, _| {
                Ok(AssetRef {
                    url: "https://cdn.test/i/1.jpg".into(),
                    storage_id: "images/1".into(),
                })
            });

        let mut repo = MockMediaRepository::new();
        repo.expect_insert().times(1).returning(|_| Ok(()));

        let source = MediaSource::Upload {
            file: UploadPayload::new(Bytes::from_static(b"raw")),
            poster: None,
        };
        let entry = service(repo, storage, optimizer)
            .create(&admin(), new_media(MediaKind::Photo, Some(source)))
            .await
            .unwrap();

        assert_eq!(entry.title, "Sunset");
        assert_eq!(entry.skills, vec!["photography".to_string()]);
        assert_eq!(entry.asset.storage_id, "images/1");
        assert!(entry.poster.is_none());
    }

    #[tokio::test]
    async fn direct_video_descriptor_skips_storage() {
        let mut storage = MockAssetStorage::new();
        storage.expect_upload().never();
        let mut repo = MockMediaRepository::new();
        repo.expect_insert().times(1).returning(|_| Ok(()));

        let source = MediaSource::Direct {
            asset: AssetRef {
                url: "https://cdn.test/v/9.mp4".into(),
                storage_id: "videos/9".into(),
            },
            poster: Some(AssetRef {
                url: "https://cdn.test/i/9.jpg".into(),
                storage_id: "images/9".into(),
            }),
        };
        let entry = service(repo, storage, MockImageOptimizer::new())
            .create(&admin(), new_media(MediaKind::Video, Some(source)))
            .await
            .unwrap();
        assert_eq!(entry.poster.unwrap().storage_id, "images/9");
    }

    #[tokio::test]
    async fn missing_fields_are_incomplete_input() {
        let cases = [
            NewMedia {
                title: "  ".into(),
                ..new_media(MediaKind::Photo, None)
            },
            NewMedia {
                skills: vec![" ".into()],
                ..new_media(MediaKind::Photo, None)
            },
            new_media(MediaKind::Photo, None),
            new_media(
                MediaKind::Photo,
                Some(MediaSource::Upload {
                    file: UploadPayload::new(Bytes::new()),
                    poster: None,
                }),
            ),
        ];
        for new in cases {
            let svc = service(
                MockMediaRepository::new(),
                MockAssetStorage::new(),
                MockImageOptimizer::new(),
            );
            let err = svc.create(&admin(), new).await.unwrap_err();
            assert!(matches!(err, DomainError::IncompleteInput(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn failed_poster_upload_releases_the_uploaded_video() {
        let mut storage = MockAssetStorage::new();
        storage
            .expect_upload()
            .withf(|_, kind| *kind == ResourceKind::Video)
            .returning(|_, _| {
                Ok(AssetRef {
                    url: "https://cdn.test/v/2.mp4".into(),
                    storage_id: "videos/2".into(),
                })
            });
        storage
            .expect_upload()
            .withf(|_, kind| *kind == ResourceKind::Image)
            .returning(|_, _| Err(anyhow::anyhow!("provider down")));
        storage
            .expect_destroy()
            .with(eq("videos/2"), eq(ResourceKind::Video))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut repo = MockMediaRepository::new();
        repo.expect_insert().never();

        let source = MediaSource::Upload {
            file: UploadPayload::new(Bytes::from_static(b"mp4")),
            poster: Some(UploadPayload::new(Bytes::from_static(b"png"))),
        };
        let err = service(repo, storage, passthrough_optimizer())
            .create(&admin(), new_media(MediaKind::Video, Some(source)))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Upstream(_)));
    }

    #[tokio::test]
    async fn edit_uploads_new_poster_before_destroying_old() {
        let old = AssetRef {
            url: "https://cdn.test/i/old.jpg".into(),
            storage_id: "images/old".into(),
        };
        let entry = video_entry(Some(old));
        let id = entry.id;

        let mut seq = Sequence::new();
        let mut repo = MockMediaRepository::new();
        repo.expect_find_by_id()
            .with(eq(id))
            .returning(move |_| Ok(Some(entry.clone())));

        let mut storage = MockAssetStorage::new();
        storage
            .expect_upload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(AssetRef {
                    url: "https://cdn.test/i/new.jpg".into(),
                    storage_id: "images/new".into(),
                })
            });
        repo.expect_update()
            .withf(|a| a.poster.as_ref().map(|p| p.storage_id.as_str()) == Some("images/new"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        storage
            .expect_destroy()
            .with(eq("images/old"), eq(ResourceKind::Image))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("already gone")));

        let edit = MediaEdit {
            description: Some("Updated".into()),
            poster: Some(UploadPayload::new(Bytes::from_static(b"png"))),
            ..MediaEdit::default()
        };
        let updated = service(repo, storage, passthrough_optimizer())
            .edit(&admin(), id, edit)
            .await
            .unwrap();
        assert_eq!(updated.description, "Updated");
        assert_eq!(updated.poster.unwrap().storage_id, "images/new");
    }

    #[tokio::test]
    async fn edit_of_unknown_media_is_not_found() {
        let mut repo = MockMediaRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));

        let err = service(repo, MockAssetStorage::new(), MockImageOptimizer::new())
            .edit(&admin(), Uuid::now_v7(), MediaEdit::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_destroys_with_matching_kinds_and_survives_storage_errors() {
        let entry = video_entry(Some(AssetRef {
            url: "https://cdn.test/i/p.jpg".into(),
            storage_id: "images/p".into(),
        }));
        let id = entry.id;

        let mut repo = MockMediaRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(entry.clone())));
        repo.expect_delete().with(eq(id)).times(1).returning(|_| Ok(true));

        let mut storage = MockAssetStorage::new();
        storage
            .expect_destroy()
            .with(eq("videos/1"), eq(ResourceKind::Video))
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));
        storage
            .expect_destroy()
            .with(eq("images/p"), eq(ResourceKind::Image))
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));

        service(repo, storage, MockImageOptimizer::new())
            .delete(&admin(), id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_signature_uses_clock_and_trims_folder() {
        let clock = Arc::new(ManualClock::new(
            chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let mut storage = MockAssetStorage::new();
        storage
            .expect_upload_signature()
            .with(eq(Some("portfolio".to_string())), eq(1_700_000_000))
            .returning(|folder, timestamp| {
                Ok(UploadSignature {
                    timestamp,
                    folder,
                    signature: "sig".into(),
                    api_key: "key".into(),
                })
            });

        let svc = MediaService::new(
            Arc::new(MockMediaRepository::new()),
            Arc::new(storage),
            Arc::new(MockImageOptimizer::new()),
            clock,
        );
        let signature = svc
            .upload_signature(&admin(), Some(" portfolio ".into()))
            .unwrap();
        assert_eq!(signature.timestamp, 1_700_000_000);
    }

    fn signed_at(timestamp: i64) -> UploadSignature {
        UploadSignature {
            timestamp,
            folder: Some("portfolio".into()),
            signature: "sig".into(),
            api_key: "key".into(),
        }
    }

    fn clocked(storage: MockAssetStorage, now: i64) -> MediaService {
        MediaService::new(
            Arc::new(MockMediaRepository::new()),
            Arc::new(storage),
            Arc::new(MockImageOptimizer::new()),
            Arc::new(ManualClock::new(
                chrono::DateTime::from_timestamp(now, 0).unwrap(),
            )),
        )
    }

    #[tokio::test]
    async fn signed_upload_is_stored_while_fresh() {
        let mut storage = MockAssetStorage::new();
        storage.expect_verify_upload_signature().return_const(true);
        storage
            .expect_upload()
            .with(mockall::predicate::always(), eq(ResourceKind::Video))
            .times(1)
            .returning(|_, _| {
                Ok(AssetRef {
                    url: "/uploads/videos/v.mp4".into(),
                    storage_id: "videos/v.mp4".into(),
                })
            });

        let stored = clocked(storage, 1_700_000_000 + SIGNED_UPLOAD_MAX_AGE_SECS)
            .accept_signed_upload(
                &signed_at(1_700_000_000),
                ResourceKind::Video,
                UploadPayload::new(vec![1u8, 2, 3]),
            )
            .await
            .unwrap();
        assert_eq!(stored.storage_id, "videos/v.mp4");
    }

    #[tokio::test]
    async fn forged_or_stale_signed_uploads_store_nothing() {
        let mut forged = MockAssetStorage::new();
        forged.expect_verify_upload_signature().return_const(false);
        forged.expect_upload().never();
        let err = clocked(forged, 1_700_000_000)
            .accept_signed_upload(
                &signed_at(1_700_000_000),
                ResourceKind::Image,
                UploadPayload::new(vec![1u8]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized));

        for now in [
            1_700_000_000 + SIGNED_UPLOAD_MAX_AGE_SECS + 1,
            1_700_000_000 - 3_600,
        ] {
            let mut stale = MockAssetStorage::new();
            stale.expect_verify_upload_signature().return_const(true);
            stale.expect_upload().never();
            let err = clocked(stale, now)
                .accept_signed_upload(
                    &signed_at(1_700_000_000),
                    ResourceKind::Image,
                    UploadPayload::new(vec![1u8]),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::Unauthorized));
        }
    }

    #[tokio::test]
    async fn signed_upload_without_bytes_is_incomplete() {
        let mut storage = MockAssetStorage::new();
        storage.expect_verify_upload_signature().return_const(true);
        storage.expect_upload().never();
        let err = clocked(storage, 1_700_000_000)
            .accept_signed_upload(
                &signed_at(1_700_000_000),
                ResourceKind::Image,
                UploadPayload::new(Vec::<u8>::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::IncompleteInput(_)));
    }
}
