//! Cross-cutting request guards and response decoration.

use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::middleware::Next;
use axum::response::Response;
use domains::DomainError;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Fails data routes up front when the store cannot answer, instead of
/// half-way through an operation.
pub async fn require_store(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(err) = state.store.ping().await {
        warn!(error = %err, path = %request.uri().path(), "store ping failed");
        return Err(DomainError::StoreUnavailable.into());
    }
    Ok(next.run(request).await)
}

const SECURITY_HEADERS: [(HeaderName, &str); 3] = [
    (X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_FRAME_OPTIONS, "DENY"),
    (REFERRER_POLICY, "strict-origin-when-cross-origin"),
];

pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers
            .entry(name)
            .or_insert(HeaderValue::from_static(value));
    }
    response
}
