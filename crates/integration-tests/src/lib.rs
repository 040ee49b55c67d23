//! Shared fixtures for the end-to-end suites: the real router over the
//! in-memory store, with a manual clock, a recording notifier and an
//! in-memory object store standing in for the outside world.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use auth_adapters::{AdminCredentials, SessionManager, SignedBlockTokens};
use domains::testing::{ManualClock, RecordingNotifier};
use domains::{AssetRef, AssetStorage, Notification, ResourceKind, UploadPayload, UploadSignature};
use services::{MediaService, MessageService, MessageSettings, RateLimitPolicy, RateLimiter};
use storage_adapters::{InMemoryStore, JpegOptimizer};
use uuid::Uuid;

#[cfg(feature = "web-axum")]
pub use app::*;

pub const ADMIN_EMAIL: &str = "admin@folio.test";
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";
pub const PUBLIC_URL: &str = "https://folio.test";
pub const SECRET: &[u8] = b"integration-secret-integration-secret";

/// Object storage double. Keeps bytes in memory and can be told to fail.
#[derive(Default)]
pub struct MemoryAssetStorage {
    objects: Mutex<HashMap<String, (ResourceKind, UploadPayload)>>,
    fail_uploads: AtomicBool,
    fail_destroys: AtomicBool,
}

impl MemoryAssetStorage {
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_destroys(&self, fail: bool) {
        self.fail_destroys.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, storage_id: &str) -> bool {
        self.objects.lock().unwrap().contains_key(storage_id)
    }

    pub fn object(&self, storage_id: &str) -> Option<UploadPayload> {
        self.objects
            .lock()
            .unwrap()
            .get(storage_id)
            .map(|(_, payload)| payload.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetStorage for MemoryAssetStorage {
    async fn upload(&self, payload: UploadPayload, kind: ResourceKind) -> anyhow::Result<AssetRef> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            anyhow::bail!("object storage offline");
        }
        let storage_id = format!("{}s/{}", kind.as_str(), Uuid::new_v4().simple());
        let url = format!("https://assets.folio.test/{storage_id}");
        self.objects
            .lock()
            .unwrap()
            .insert(storage_id.clone(), (kind, payload));
        Ok(AssetRef { url, storage_id })
    }

    async fn destroy(&self, storage_id: &str, kind: ResourceKind) -> anyhow::Result<()> {
        if self.fail_destroys.load(Ordering::SeqCst) {
            anyhow::bail!("object storage offline");
        }
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get(storage_id).map(|(stored, _)| *stored);
        match stored {
            Some(stored) if stored == kind => {
                objects.remove(storage_id);
                Ok(())
            }
            Some(stored) => anyhow::bail!("{storage_id} is a {} object", stored.as_str()),
            None => anyhow::bail!("{storage_id} not found"),
        }
    }

    fn upload_signature(
        &self,
        folder: Option<String>,
        timestamp: i64,
    ) -> anyhow::Result<UploadSignature> {
        Ok(UploadSignature {
            signature: format!("sig:{}:{timestamp}", folder.as_deref().unwrap_or("-")),
            timestamp,
            folder,
            api_key: "test-key".to_string(),
        })
    }

    fn verify_upload_signature(&self, presented: &UploadSignature) -> bool {
        self.upload_signature(presented.folder.clone(), presented.timestamp)
            .is_ok_and(|expected| expected == *presented)
    }
}

/// Services wired over test doubles, without any HTTP.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub storage: Arc<MemoryAssetStorage>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub messages: Arc<MessageService>,
    pub media: Arc<MediaService>,
    pub sessions: Arc<SessionManager>,
}

impl Harness {
    pub fn new(policy: RateLimitPolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let storage = Arc::new(MemoryAssetStorage::default());
        let clock = Arc::new(ManualClock::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let messages = Arc::new(MessageService::new(
            store.clone(),
            RateLimiter::new(store.clone(), policy),
            Arc::new(SignedBlockTokens::new(SECRET)),
            notifier.clone(),
            clock.clone(),
            MessageSettings {
                public_url: PUBLIC_URL.to_string(),
                ..MessageSettings::default()
            },
        ));
        let media = Arc::new(MediaService::new(
            store.clone(),
            storage.clone(),
            Arc::new(JpegOptimizer),
            clock.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            SECRET,
            AdminCredentials {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string().into(),
            },
            chrono::Duration::hours(12),
        ));

        Self {
            store,
            storage,
            clock,
            notifier,
            messages,
            media,
            sessions,
        }
    }

    /// Path of the opt-out link sent to `email`, relative to the site root.
    pub fn block_path_for(&self, email: &str) -> Option<String> {
        self.notifier.sent().into_iter().rev().find_map(|n| match n {
            Notification::AutoReply { to, block_url, .. } if to == email => {
                block_url.strip_prefix(PUBLIC_URL).map(str::to_string)
            }
            _ => None,
        })
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

#[cfg(feature = "web-axum")]
mod app {
    use std::ops::Deref;
    use std::sync::Arc;

    use api_adapters::{AppState, HttpSettings, Metrics};
    use axum::body::{to_bytes, Body};
    use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
    use axum::http::{HeaderMap, Request, StatusCode};
    use axum::Router;
    use bytes::Bytes;
    use serde_json::Value;
    use services::RateLimitPolicy;
    use tower::ServiceExt;

    use super::{Harness, ADMIN_EMAIL, ADMIN_PASSWORD};

    /// The full router in front of a [`Harness`].
    pub struct TestApp {
        pub harness: Harness,
        pub router: Router,
    }

    pub struct TestResponse {
        pub status: StatusCode,
        pub headers: HeaderMap,
        pub body: Bytes,
    }

    impl TestResponse {
        pub fn json(&self) -> Value {
            serde_json::from_slice(&self.body).unwrap_or_else(|err| {
                panic!("body is not JSON ({err}): {}", self.text())
            })
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    /// A file part for [`multipart_body`].
    pub struct FilePart<'a> {
        pub field: &'a str,
        pub file_name: &'a str,
        pub content_type: &'a str,
        pub bytes: Vec<u8>,
    }

    pub const BOUNDARY: &str = "portfolio-test-boundary";

    pub fn multipart_body(fields: &[(&str, &str)], files: Vec<FilePart<'_>>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for file in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    file.field, file.file_name, file.content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(&file.bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    impl TestApp {
        pub fn new() -> Self {
            Self::with_policy(RateLimitPolicy::default())
        }

        pub fn with_policy(policy: RateLimitPolicy) -> Self {
            let harness = Harness::new(policy);
            let state = AppState {
                messages: harness.messages.clone(),
                media: harness.media.clone(),
                sessions: harness.sessions.clone(),
                store: harness.store.clone(),
                clock: harness.clock.clone(),
                metrics: Arc::new(Metrics::new()),
                http: Arc::new(HttpSettings {
                    owner_name: "Test Owner".to_string(),
                    ..HttpSettings::default()
                }),
            };
            let router = api_adapters::router(state);
            Self { harness, router }
        }

        pub async fn send(&self, request: Request<Body>) -> TestResponse {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            TestResponse {
                status,
                headers,
                body,
            }
        }

        pub async fn get(&self, path: &str, cookie: Option<&str>) -> TestResponse {
            let mut builder = Request::get(path);
            if let Some(cookie) = cookie {
                builder = builder.header(COOKIE, cookie);
            }
            self.send(builder.body(Body::empty()).unwrap()).await
        }

        pub async fn post_json(&self, path: &str, body: Value, cookie: Option<&str>) -> TestResponse {
            let mut builder = Request::post(path).header(CONTENT_TYPE, "application/json");
            if let Some(cookie) = cookie {
                builder = builder.header(COOKIE, cookie);
            }
            self.send(builder.body(Body::from(body.to_string())).unwrap())
                .await
        }

        pub async fn post_multipart(&self, path: &str, body: Vec<u8>, cookie: &str) -> TestResponse {
            let request = Request::post(path)
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .header(COOKIE, cookie)
                .body(Body::from(body))
                .unwrap();
            self.send(request).await
        }

        /// Multipart POST without any session cookie.
        pub async fn post_multipart_anonymous(&self, path: &str, body: Vec<u8>) -> TestResponse {
            let request = Request::post(path)
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap();
            self.send(request).await
        }

        /// Contact form submission from `ip`.
        pub async fn submit(&self, email: &str, name: &str, description: &str, ip: &str) -> TestResponse {
            let request = Request::post("/messages")
                .header(CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", ip)
                .body(Body::from(
                    serde_json::json!({ "email": email, "name": name, "description": description })
                        .to_string(),
                ))
                .unwrap();
            self.send(request).await
        }

        /// Logs the admin in and returns the `Cookie` header value to send.
        pub async fn login(&self) -> String {
            let response = self
                .post_json(
                    "/admin/login",
                    serde_json::json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
                    None,
                )
                .await;
            assert_eq!(response.status, StatusCode::OK, "{}", response.text());
            let set_cookie = response.headers[SET_COOKIE].to_str().unwrap();
            set_cookie
                .split(';')
                .next()
                .unwrap()
                .to_string()
        }
    }

    impl Default for TestApp {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Deref for TestApp {
        type Target = Harness;

        fn deref(&self) -> &Harness {
            &self.harness
        }
    }
}
