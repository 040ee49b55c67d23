//! Admin session routes and message moderation.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use domains::{DomainError, Message, Page};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{parse_id, Ack, IdRequest, PageQuery};
use crate::error::ApiError;
use crate::extract::{cleared_session_cookie, read_cookie, session_cookie, AdminAuth, JsonBody, SESSION_COOKIE};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    #[serde(rename = "_id", alias = "id")]
    pub id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub message: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.to_string(),
            name: message.name,
            email: message.email,
            message: message.body,
            status: message.status.to_string(),
            created_at: message.created_at,
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = request.email.unwrap_or_default();
    let password = request.password.unwrap_or_default();
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Email and password required"));
    }

    let (cookie, _session) = state.sessions.login(&email, &password, state.clock.now())?;
    let header = session_cookie(
        &cookie,
        state.sessions.ttl().num_seconds(),
        state.http.secure_cookies,
    );
    Ok(([header], Json(Ack::ok("Login successful"))))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(cookie) = read_cookie(&headers, SESSION_COOKIE) {
        state.sessions.logout(&cookie, state.clock.now());
    }
    (
        [cleared_session_cookie(state.http.secure_cookies)],
        Json(Ack::ok("Logged out")),
    )
}

pub async fn check_auth(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let session = read_cookie(&headers, SESSION_COOKIE)
        .and_then(|cookie| state.sessions.authenticate(&cookie, state.clock.now()).ok());
    let authenticated = session.is_some();
    Json(json!({
        "status": 200,
        "authenticated": authenticated,
        "admin": authenticated,
        "email": session.map(|s| s.email),
    }))
}

pub async fn list_messages(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<MessageView>>, ApiError> {
    let page = state
        .messages
        .list(&admin, query.page_request()?)
        .await?
        .map(MessageView::from);
    Ok(Json(page))
}

pub async fn respond(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    JsonBody(request): JsonBody<RespondRequest>,
) -> Result<Json<Ack>, ApiError> {
    let id = parse_id(request.id.as_deref())?;
    let status = request
        .status
        .ok_or_else(|| DomainError::InvalidInput("status is required".to_string()))?;
    state.messages.respond_to(&admin, id, &status).await?;
    Ok(Json(Ack::ok("Status updated")))
}

pub async fn block(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    JsonBody(request): JsonBody<IdRequest>,
) -> Result<Json<Ack>, ApiError> {
    let id = parse_id(request.id.as_deref())?;
    let email = state.messages.block_message(&admin, id).await?;
    info!(%email, "sender blocked by admin");
    Ok(Json(Ack::ok(format!("{email} has been blocked"))))
}

pub async fn delete_message(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    JsonBody(request): JsonBody<IdRequest>,
) -> Result<Json<Ack>, ApiError> {
    let id = parse_id(request.id.as_deref())?;
    state.messages.delete(&admin, id).await?;
    Ok(Json(Ack::ok("Message deleted")))
}
