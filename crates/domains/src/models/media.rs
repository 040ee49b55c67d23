use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// What a gallery entry shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// The storage resource type the primary asset is uploaded under.
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            Self::Photo => ResourceKind::Image,
            Self::Video => ResourceKind::Video,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" | "image" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            other => Err(DomainError::InvalidInput(format!("unknown media type '{other}'"))),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing filter for the public gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFilter {
    #[default]
    All,
    Only(MediaKind),
}

impl FromStr for MediaFilter {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only)
    }
}

/// Remote storage resource type. A destroy call must name the same kind the
/// object was uploaded under or the provider silently ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Video,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// A remote object owned by exactly one gallery entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub url: String,
    pub storage_id: String,
}

/// One gallery entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub title: String,
    pub kind: MediaKind,
    pub description: String,
    pub skills: Vec<String>,
    pub asset: AssetRef,
    /// Only ever set for [`MediaKind::Video`].
    pub poster: Option<AssetRef>,
    pub created_at: DateTime<Utc>,
}

/// Raw bytes of an uploaded file as received by the API layer.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPayload {
    pub bytes: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<mime::Mime>,
}

impl UploadPayload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
            content_type: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where the content of a new gallery entry comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    /// Server-mediated upload; photos and posters go through the optimizer.
    Upload {
        file: UploadPayload,
        poster: Option<UploadPayload>,
    },
    /// The client already uploaded to the provider with a minted signature.
    Direct {
        asset: AssetRef,
        poster: Option<AssetRef>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMedia {
    pub kind: MediaKind,
    pub title: String,
    pub description: String,
    pub skills: Vec<String>,
    pub source: Option<MediaSource>,
}

/// Partial update of a gallery entry. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub skills: Option<Vec<String>>,
    pub poster: Option<UploadPayload>,
}

/// Credential for a client-side direct upload to the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSignature {
    pub timestamp: i64,
    pub folder: Option<String>,
    pub signature: String,
    pub api_key: String,
}

/// Trims every tag, drops empties and repeats, keeps first-seen order.
pub fn normalize_skills<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut skills: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !skills.iter().any(|seen| seen == tag) {
            skills.push(tag.to_string());
        }
    }
    skills
}

/// Splits a comma-separated form field into normalized tags.
pub fn split_skills(raw: &str) -> Vec<String> {
    normalize_skills(raw.split(','))
}
