//! Request extractors: client IP, JSON bodies with JSON rejections, and the
//! admin session gate.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Request};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::Json;
use domains::{AdminSession, DomainError};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "portfolio_session";

/// Caller address for rate limiting: the first `X-Forwarded-For` entry when
/// present, else the socket peer. The header is trusted as-is, so the
/// service must sit behind a proxy that overwrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Ok(Self(ip.to_string()));
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self(peer))
    }
}

/// `axum::Json` whose rejections use the API's JSON error body.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// A live admin session. Handlers taking this never run for anyone else.
pub struct AdminAuth(pub AdminSession);

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookie = read_cookie(&parts.headers, SESSION_COOKIE).ok_or(DomainError::Unauthorized)?;
        let session = state.sessions.authenticate(&cookie, state.clock.now())?;
        Ok(Self(session))
    }
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(value: &str, max_age_secs: i64, secure: bool) -> (axum::http::HeaderName, HeaderValue) {
    let mut cookie = format!(
        "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    // Signed tokens are URL-safe base64 and dots, always a valid header value.
    let value = HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""));
    (SET_COOKIE, value)
}

pub fn cleared_session_cookie(secure: bool) -> (axum::http::HeaderName, HeaderValue) {
    session_cookie("", 0, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    async fn client_ip(request: HttpRequest<()>) -> String {
        let (mut parts, _) = request.into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        ip
    }

    #[tokio::test]
    async fn first_forwarded_entry_wins() {
        let request = HttpRequest::builder()
            .header("x-forwarded-for", " 203.0.113.7 , 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(request).await, "203.0.113.7");
    }

    #[tokio::test]
    async fn falls_back_to_peer_address() {
        let mut request = HttpRequest::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4711))));
        assert_eq!(client_ip(request).await, "192.0.2.1");

        let bare = HttpRequest::builder().body(()).unwrap();
        assert_eq!(client_ip(bare).await, "unknown");
    }

    #[test]
    fn cookie_lookup_handles_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; portfolio_session=abc.def.ghi"));
        assert_eq!(read_cookie(&headers, SESSION_COOKIE).as_deref(), Some("abc.def.ghi"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn session_cookie_is_http_only() {
        let (_, value) = session_cookie("tok", 3600, true);
        let value = value.to_str().unwrap();
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=3600"));
        assert!(value.ends_with("Secure"));
    }
}
