//! Public gallery listing and the admin media routes.

use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use domains::{
    split_skills, normalize_skills, AssetRef, DomainError, MediaAsset, MediaEdit, MediaFilter,
    MediaKind, MediaSource, NewMedia, Page, ResourceKind, UploadPayload, UploadSignature,
};
use serde::{Deserialize, Serialize};

use super::{parse_id, Ack, IdRequest, PageQuery};
use crate::error::ApiError;
use crate::extract::{AdminAuth, JsonBody};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MediaView {
    pub id: String,
    pub title: String,
    pub file_type: MediaKind,
    pub description: String,
    pub skills: Vec<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MediaAsset> for MediaView {
    fn from(asset: MediaAsset) -> Self {
        Self {
            id: asset.id.to_string(),
            title: asset.title,
            file_type: asset.kind,
            description: asset.description,
            skills: asset.skills,
            url: asset.asset.url,
            poster_url: asset.poster.map(|p| p.url),
            created_at: asset.created_at,
        }
    }
}

/// Skills arrive as a comma-separated string or as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SkillsField {
    List(Vec<String>),
    Text(String),
}

impl SkillsField {
    fn into_skills(self) -> Vec<String> {
        match self {
            Self::List(list) => normalize_skills(list),
            Self::Text(text) => split_skills(&text),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    #[serde(rename = "_id", alias = "id")]
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub skills: Option<SkillsField>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignatureRequest {
    pub folder: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<MediaView>>, ApiError> {
    let filter: MediaFilter = match query.kind.as_deref().map(str::trim) {
        None | Some("") => MediaFilter::All,
        Some(raw) => raw.parse()?,
    };
    let page = state
        .media
        .list(filter, query.page_request()?)
        .await?
        .map(MediaView::from);
    Ok(Json(page))
}

/// Text fields and files of one multipart form, collected in any order.
#[derive(Default)]
struct MediaForm {
    kind: Option<String>,
    title: Option<String>,
    description: Option<String>,
    skills: Option<String>,
    file: Option<UploadPayload>,
    poster: Option<UploadPayload>,
    url: Option<String>,
    storage_id: Option<String>,
    poster_url: Option<String>,
    poster_storage_id: Option<String>,
    id: Option<String>,
}

impl MediaForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" | "poster" => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().and_then(|ct| ct.parse().ok());
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|err| ApiError::bad_request(err.body_text()))?;
                    let payload = UploadPayload {
                        bytes,
                        file_name,
                        content_type,
                    };
                    let payload = (!payload.is_empty()).then_some(payload);
                    if name == "file" {
                        form.file = payload;
                    } else {
                        form.poster = payload;
                    }
                }
                _ => {
                    let value = field
                        .text()
                        .await
                        .map_err(|err| ApiError::bad_request(err.body_text()))?;
                    let slot = match name.as_str() {
                        "type" | "file_type" => &mut form.kind,
                        "title" => &mut form.title,
                        "description" => &mut form.description,
                        "skills" => &mut form.skills,
                        "url" => &mut form.url,
                        "storage_id" | "public_id" => &mut form.storage_id,
                        "poster_url" => &mut form.poster_url,
                        "poster_storage_id" | "poster_public_id" => &mut form.poster_storage_id,
                        "_id" | "id" => &mut form.id,
                        _ => continue,
                    };
                    *slot = Some(value);
                }
            }
        }
        Ok(form)
    }

    fn into_new_media(self) -> Result<NewMedia, DomainError> {
        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => MediaKind::Photo,
            Some(raw) => raw.parse()?,
        };
        let asset = descriptor(self.url, self.storage_id, "url")?;
        let poster = descriptor(self.poster_url, self.poster_storage_id, "poster url")?;
        let source = match (self.file, asset) {
            (Some(file), _) => Some(MediaSource::Upload {
                file,
                poster: self.poster,
            }),
            (None, Some(asset)) => Some(MediaSource::Direct { asset, poster }),
            (None, None) => None,
        };
        Ok(NewMedia {
            kind,
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            skills: self.skills.as_deref().map(split_skills).unwrap_or_default(),
            source,
        })
    }
}

/// A URL and its storage id come as a pair or not at all.
fn descriptor(
    url: Option<String>,
    storage_id: Option<String>,
    field: &str,
) -> Result<Option<AssetRef>, DomainError> {
    match (url, storage_id) {
        (None, None) => Ok(None),
        (Some(url), Some(storage_id)) => Ok(Some(AssetRef { url, storage_id })),
        _ => Err(DomainError::IncompleteInput(format!(
            "{field} and its storage id are required"
        ))),
    }
}

pub async fn upload(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    multipart: Multipart,
) -> Result<Json<Ack<MediaView>>, ApiError> {
    let new = MediaForm::read(multipart).await?.into_new_media()?;
    let created = state.media.create(&admin, new).await?;
    state.metrics.record_media("create");
    Ok(Json(Ack::with(
        "Media uploaded successfully!",
        MediaView::from(created),
    )))
}

/// Accepts JSON for text edits, or multipart when a new poster comes along.
pub async fn edit(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    request: Request,
) -> Result<Json<Ack<MediaView>>, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (id, edit) = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;
        let form = MediaForm::read(multipart).await?;
        let edit = MediaEdit {
            title: form.title,
            description: form.description,
            skills: form.skills.as_deref().map(split_skills),
            poster: form.poster,
        };
        (form.id, edit)
    } else {
        let JsonBody(body) = JsonBody::<EditRequest>::from_request(request, &state).await?;
        let edit = MediaEdit {
            title: body.title,
            description: body.description,
            skills: body.skills.map(SkillsField::into_skills),
            poster: None,
        };
        (body.id, edit)
    };

    let id = parse_id(id.as_deref())?;
    let updated = state.media.edit(&admin, id, edit).await?;
    state.metrics.record_media("edit");
    Ok(Json(Ack::with("Media updated", MediaView::from(updated))))
}

pub async fn delete(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    JsonBody(request): JsonBody<IdRequest>,
) -> Result<Json<Ack>, ApiError> {
    let id = parse_id(request.id.as_deref())?;
    state.media.delete(&admin, id).await?;
    state.metrics.record_media("delete");
    Ok(Json(Ack::ok("Media deleted")))
}

/// Body is optional; an empty POST signs without a folder.
pub async fn generate_signature(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    body: Bytes,
) -> Result<Json<UploadSignature>, ApiError> {
    let request: SignatureRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SignatureRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))?
    };
    let signature = state.media.upload_signature(&admin, request.folder)?;
    state.metrics.record_media("sign");
    Ok(Json(signature))
}

/// What a signed upload hands back; `public_id` and `secure_url` mirror
/// the names hosted providers use.
#[derive(Debug, Serialize)]
pub struct StoredObject {
    pub url: String,
    pub storage_id: String,
    pub public_id: String,
    pub secure_url: String,
    pub resource_type: &'static str,
}

impl StoredObject {
    fn new(asset: AssetRef, kind: ResourceKind) -> Self {
        Self {
            public_id: asset.storage_id.clone(),
            secure_url: asset.url.clone(),
            url: asset.url,
            storage_id: asset.storage_id,
            resource_type: kind.as_str(),
        }
    }
}

/// Client-side upload authorised by a credential from
/// `/admin/generate-signature` instead of a session.
pub async fn signed_upload(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<StoredObject>, ApiError> {
    let kind = match resource_type.as_str() {
        "image" => ResourceKind::Image,
        "video" => ResourceKind::Video,
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown resource type '{other}'"
            )))
        }
    };

    let mut file = None;
    let mut api_key = None;
    let mut timestamp = None;
    let mut signature = None;
    let mut folder = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().and_then(|ct| ct.parse().ok());
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::bad_request(err.body_text()))?;
            file = Some(UploadPayload {
                bytes,
                file_name,
                content_type,
            });
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;
        match name.as_str() {
            "api_key" => api_key = Some(value),
            "timestamp" => timestamp = Some(value),
            "signature" => signature = Some(value),
            "folder" => folder = Some(value).filter(|f| !f.trim().is_empty()),
            _ => {}
        }
    }

    let (Some(api_key), Some(timestamp), Some(signature)) = (api_key, timestamp, signature) else {
        return Err(DomainError::Unauthorized.into());
    };
    let timestamp = timestamp
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request("timestamp must be an integer"))?;
    let presented = UploadSignature {
        timestamp,
        folder,
        signature,
        api_key,
    };

    let file = file.unwrap_or_else(|| UploadPayload::new(Bytes::new()));
    let stored = state
        .media
        .accept_signed_upload(&presented, kind, file)
        .await?;
    state.metrics.record_media("signed_upload");
    Ok(Json(StoredObject::new(stored, kind)))
}
