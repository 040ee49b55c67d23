//! # Local asset storage
//!
//! Filesystem implementation of `AssetStorage`. Objects live under
//! `root/{images|videos}/ab/cd/<digest>-<nonce>.<ext>` and are served back
//! by the API layer under `url_prefix`.
//!
//! Every upload gets its own object even when the bytes repeat, so releasing
//! one gallery entry never pulls a file out from under another.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use domains::{AssetRef, AssetStorage, ResourceKind, UploadPayload, UploadSignature};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct LocalAssetStorage {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root: PathBuf,
    /// Public URL prefix (e.g., "/uploads")
    url_prefix: String,
    api_key: String,
    api_secret: SecretString,
}

impl LocalAssetStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: SecretString,
    ) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(kind: ResourceKind) -> &'static str {
        match kind {
            ResourceKind::Image => "images",
            ResourceKind::Video => "videos",
        }
    }

    /// Builds "images/ab/cd/<digest>-<nonce>.jpg".
    fn object_key(kind: ResourceKind, bytes: &[u8], extension: &str) -> String {
        let digest = hex::encode(Sha256::digest(bytes));
        let nonce = Uuid::new_v4().simple().to_string();
        format!(
            "{}/{}/{}/{}-{}.{}",
            Self::kind_dir(kind),
            &digest[0..2],
            &digest[2..4],
            &digest[..32],
            &nonce[..12],
            extension
        )
    }

    /// Resolves a storage id to a path under `root`, refusing anything that
    /// could escape it.
    fn resolve(&self, storage_id: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(storage_id);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !clean || storage_id.is_empty() {
            anyhow::bail!("storage id '{storage_id}' is not a relative object key");
        }
        Ok(self.root.join(relative))
    }
}

fn extension_for(payload: &UploadPayload) -> String {
    if let Some(mime) = &payload.content_type {
        let known = match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("image", "jpeg") => Some("jpg"),
            ("image", "png") => Some("png"),
            ("image", "webp") => Some("webp"),
            ("image", "gif") => Some("gif"),
            ("video", "mp4") => Some("mp4"),
            ("video", "webm") => Some("webm"),
            ("video", "quicktime") => Some("mov"),
            _ => None,
        };
        if let Some(ext) = known {
            return ext.to_string();
        }
        if let Some(ext) = mime_guess::get_mime_extensions(mime).and_then(|exts| exts.first()) {
            return (*ext).to_string();
        }
    }
    payload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// The string both sides sign: sorted `key=value` pairs joined with `&`.
fn canonical_params(folder: Option<&str>, timestamp: i64) -> String {
    let mut params = Vec::with_capacity(2);
    if let Some(folder) = folder {
        params.push(format!("folder={folder}"));
    }
    params.push(format!("timestamp={timestamp}"));
    params.join("&")
}

fn params_mac(secret: &[u8], folder: Option<&str>, timestamp: i64) -> anyhow::Result<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|err| anyhow::anyhow!("signing key rejected: {err}"))?;
    mac.update(canonical_params(folder, timestamp).as_bytes());
    Ok(mac)
}

/// Hex HMAC-SHA256 over the canonical parameter string.
pub fn sign_params(
    secret: &[u8],
    folder: Option<&str>,
    timestamp: i64,
) -> anyhow::Result<String> {
    let mac = params_mac(secret, folder, timestamp)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl AssetStorage for LocalAssetStorage {
    #[instrument(skip(self, payload), fields(bytes = payload.bytes.len(), kind = kind.as_str()))]
    async fn upload(&self, payload: UploadPayload, kind: ResourceKind) -> anyhow::Result<AssetRef> {
        if payload.is_empty() {
            anyhow::bail!("refusing to store an empty object");
        }
        let storage_id = Self::object_key(kind, &payload.bytes, &extension_for(&payload));
        let target = self.resolve(&storage_id)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &payload.bytes).await?;
        debug!(%storage_id, "object stored");

        Ok(AssetRef {
            url: format!("{}/{}", self.url_prefix, storage_id),
            storage_id,
        })
    }

    #[instrument(skip(self), fields(kind = kind.as_str()))]
    async fn destroy(&self, storage_id: &str, kind: ResourceKind) -> anyhow::Result<()> {
        let expected = Self::kind_dir(kind);
        if storage_id.split('/').next() != Some(expected) {
            anyhow::bail!("object '{storage_id}' is not a {} resource", kind.as_str());
        }
        let target = self.resolve(storage_id)?;
        fs::remove_file(&target).await?;
        debug!("object released");
        Ok(())
    }

    fn upload_signature(
        &self,
        folder: Option<String>,
        timestamp: i64,
    ) -> anyhow::Result<UploadSignature> {
        let signature = sign_params(
            self.api_secret.expose_secret().as_bytes(),
            folder.as_deref(),
            timestamp,
        )?;
        Ok(UploadSignature {
            timestamp,
            folder,
            signature,
            api_key: self.api_key.clone(),
        })
    }

    fn verify_upload_signature(&self, presented: &UploadSignature) -> bool {
        if presented.api_key != self.api_key {
            return false;
        }
        let Ok(signature) = hex::decode(&presented.signature) else {
            return false;
        };
        match params_mac(
            self.api_secret.expose_secret().as_bytes(),
            presented.folder.as_deref(),
            presented.timestamp,
        ) {
            Ok(mac) => mac.verify_slice(&signature).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &Path) -> LocalAssetStorage {
        LocalAssetStorage::new(root, "/uploads/", "key-123", SecretString::from("shh".to_string()))
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("portfolio-local-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn upload_then_destroy_with_matching_kind() {
        let root = scratch_dir();
        let store = storage(&root);
        let mut payload = UploadPayload::new(vec![1u8, 2, 3]);
        payload.content_type = Some(mime::IMAGE_JPEG);

        let stored = store.upload(payload, ResourceKind::Image).await.unwrap();
        assert!(stored.storage_id.starts_with("images/"));
        assert!(stored.storage_id.ends_with(".jpg"));
        assert_eq!(stored.url, format!("/uploads/{}", stored.storage_id));
        assert!(root.join(&stored.storage_id).exists());

        assert!(store
            .destroy(&stored.storage_id, ResourceKind::Video)
            .await
            .is_err());
        store
            .destroy(&stored.storage_id, ResourceKind::Image)
            .await
            .unwrap();
        assert!(!root.join(&stored.storage_id).exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn identical_bytes_get_separate_objects() {
        let root = scratch_dir();
        let store = storage(&root);
        let a = store
            .upload(UploadPayload::new(vec![9u8; 16]), ResourceKind::Video)
            .await
            .unwrap();
        let b = store
            .upload(UploadPayload::new(vec![9u8; 16]), ResourceKind::Video)
            .await
            .unwrap();
        assert_ne!(a.storage_id, b.storage_id);

        store.destroy(&a.storage_id, ResourceKind::Video).await.unwrap();
        assert!(root.join(&b.storage_id).exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn destroy_refuses_paths_outside_root() {
        let store = storage(&scratch_dir());
        assert!(store
            .destroy("images/../../etc/passwd", ResourceKind::Image)
            .await
            .is_err());
        assert!(store.destroy("/images/x.jpg", ResourceKind::Image).await.is_err());
    }

    #[test]
    fn extension_falls_back_to_file_name_then_bin() {
        let mut payload = UploadPayload::new(vec![1u8]);
        payload.file_name = Some("clip.MOV".into());
        assert_eq!(extension_for(&payload), "mov");
        payload.file_name = Some("weird.e x e".into());
        assert_eq!(extension_for(&payload), "bin");
    }

    #[test]
    fn signature_covers_folder_and_timestamp() {
        let store = storage(Path::new("/tmp"));
        let with_folder = store
            .upload_signature(Some("portfolio".into()), 1_700_000_000)
            .unwrap();
        let without = store.upload_signature(None, 1_700_000_000).unwrap();

        assert_eq!(with_folder.api_key, "key-123");
        assert_eq!(with_folder.signature.len(), 64);
        assert_ne!(with_folder.signature, without.signature);
        assert_eq!(
            with_folder.signature,
            sign_params(b"shh", Some("portfolio"), 1_700_000_000).unwrap()
        );
    }

    #[test]
    fn only_untouched_signatures_verify() {
        let store = storage(Path::new("/tmp"));
        let minted = store
            .upload_signature(Some("portfolio".into()), 1_700_000_000)
            .unwrap();
        assert!(store.verify_upload_signature(&minted));

        let moved = UploadSignature {
            folder: Some("elsewhere".into()),
            ..minted.clone()
        };
        let later = UploadSignature {
            timestamp: minted.timestamp + 1,
            ..minted.clone()
        };
        let other_key = UploadSignature {
            api_key: "key-456".into(),
            ..minted.clone()
        };
        let garbled = UploadSignature {
            signature: "zz".repeat(32),
            ..minted.clone()
        };
        for forged in [moved, later, other_key, garbled] {
            assert!(!store.verify_upload_signature(&forged), "{forged:?}");
        }

        let foreign = LocalAssetStorage::new(
            "/tmp",
            "/uploads",
            "key-123",
            SecretString::from("different".to_string()),
        );
        assert!(!foreign.verify_upload_signature(&minted));
    }
}
