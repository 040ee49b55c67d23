//! # ApiError
//!
//! The one error type every handler returns. Domain failures map onto HTTP
//! statuses; the body is always `{"status": <code>, "message": <text>}`
//! except for rejected block links, which get a small HTML page because a
//! person clicked them from an email.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use domains::DomainError;
use serde_json::json;
use tracing::{error, warn};

const INVALID_LINK_TEXT: &str =
    "Invalid or expired link. Please try sending a new message to get a fresh link.";

#[derive(Template)]
#[template(path = "invalid_link.html")]
struct InvalidLinkPage<'a> {
    message: &'a str,
}

#[derive(Debug)]
pub enum ApiError {
    Domain(DomainError),
    /// Request shape problems caught before any service is called.
    BadRequest(String),
    /// Failures of our own plumbing (templates, metrics encoding).
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Domain(err) => status_for(err),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::InvalidInput(_)
        | DomainError::IncompleteInput(_)
        | DomainError::AlreadyPending
        | DomainError::InvalidToken => StatusCode::BAD_REQUEST,
        DomainError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        DomainError::Blocked | DomainError::Unauthorized => StatusCode::FORBIDDEN,
        DomainError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::StoreUnavailable | DomainError::Store(_) | DomainError::Upstream(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn json_body(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "status": status.as_u16(), "message": message })),
    )
        .into_response()
}

fn invalid_link_page() -> Response {
    let page = InvalidLinkPage {
        message: INVALID_LINK_TEXT,
    };
    match page.render() {
        Ok(html) => (StatusCode::BAD_REQUEST, Html(html)).into_response(),
        Err(err) => {
            error!(error = %err, "invalid link page failed to render");
            (StatusCode::BAD_REQUEST, INVALID_LINK_TEXT).into_response()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Domain(DomainError::InvalidToken) => invalid_link_page(),
            Self::Domain(DomainError::StoreUnavailable) => {
                error!("store health check failed");
                json_body(status, "Database unavailable, please refresh the page.")
            }
            Self::Domain(err @ (DomainError::Store(_) | DomainError::Upstream(_))) => {
                error!(error = ?err, "request failed");
                json_body(status, "Something went wrong, please try again.")
            }
            Self::Domain(err) => {
                if status.is_client_error() {
                    warn!(%status, error = %err, "request rejected");
                }
                json_body(status, &capitalize(&err.to_string()))
            }
            Self::BadRequest(message) => json_body(status, &message),
            Self::Internal(message) => {
                error!(%message, "internal error");
                json_body(status, "Something went wrong, please try again.")
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn domain_errors_map_to_documented_statuses() {
        let cases = [
            (DomainError::InvalidInput("x".into()), 400),
            (DomainError::IncompleteInput("x".into()), 400),
            (DomainError::AlreadyPending, 400),
            (DomainError::RateLimited, 429),
            (DomainError::Blocked, 403),
            (DomainError::Unauthorized, 403),
            (DomainError::InvalidCredentials, 401),
            (DomainError::not_found("media"), 404),
            (DomainError::InvalidToken, 400),
            (DomainError::StoreUnavailable, 500),
        ];
        for (err, code) in cases {
            assert_eq!(status_for(&err).as_u16(), code, "{err}");
        }
    }

    #[tokio::test]
    async fn json_body_carries_status_and_message() {
        let response = ApiError::from(DomainError::AlreadyPending).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(body["status"], 400);
        assert_eq!(
            body["message"],
            "You have a pending message, please wait for a response"
        );
    }

    #[tokio::test]
    async fn store_details_are_not_leaked() {
        let err = DomainError::store(anyhow::anyhow!("password authentication failed for user"));
        let body = body_of(ApiError::from(err).into_response()).await;
        assert!(!body.contains("password"));
    }

    #[tokio::test]
    async fn invalid_token_renders_html() {
        let response = ApiError::from(DomainError::InvalidToken).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(body_of(response).await.contains("Invalid or expired link"));
    }
}
