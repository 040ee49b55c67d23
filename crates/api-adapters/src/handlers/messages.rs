//! Public contact intake and the opt-out link.

use askama::Template;
use axum::extract::{Path, State};
use axum::response::Html;
use axum::Json;
use domains::{DomainError, SubmitOutcome};
use serde::Deserialize;
use services::MessageService;

use super::Ack;
use crate::error::ApiError;
use crate::extract::{ClientIp, JsonBody};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "message")]
    pub description: Option<String>,
}

#[derive(Template)]
#[template(path = "block_success.html")]
struct BlockSuccessPage<'a> {
    email: &'a str,
    owner_name: &'a str,
}

fn outcome_label(result: &Result<SubmitOutcome, DomainError>) -> &'static str {
    match result {
        Ok(SubmitOutcome::Created(_)) => "created",
        Ok(SubmitOutcome::Appended(_)) => "appended",
        Err(DomainError::RateLimited) => "rate_limited",
        Err(DomainError::Blocked) => "blocked",
        Err(DomainError::AlreadyPending) => "already_pending",
        Err(DomainError::InvalidInput(_)) => "invalid",
        Err(_) => "error",
    }
}

pub async fn submit(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    JsonBody(request): JsonBody<SubmitRequest>,
) -> Result<Json<Ack>, ApiError> {
    let result = match MessageService::validate(
        request.email.as_deref().unwrap_or_default(),
        request.name.as_deref().unwrap_or_default(),
        request.description.as_deref().unwrap_or_default(),
        &ip,
    ) {
        Ok(submission) => state.messages.submit(submission).await,
        Err(err) => Err(err),
    };
    state.metrics.record_submission(outcome_label(&result));

    let message = match result? {
        SubmitOutcome::Created(_) => "Message sent successfully!",
        SubmitOutcome::Appended(_) => "Message added to your conversation.",
    };
    Ok(Json(Ack::ok(message)))
}

pub async fn block_user(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Html<String>, ApiError> {
    let email = state.messages.block_by_token(&token).await?;
    let page = BlockSuccessPage {
        email: email.as_str(),
        owner_name: &state.http.owner_name,
    };
    page.render()
        .map(Html)
        .map_err(|err| ApiError::internal(format!("block page failed to render: {err}")))
}
