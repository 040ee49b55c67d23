use std::path::PathBuf;
use std::sync::Arc;

use auth_adapters::SessionManager;
use domains::{Clock, StoreHealth};
use services::{MediaService, MessageService};

use crate::metrics::Metrics;

/// HTTP-only knobs; everything else lives in the services.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Built frontend, served for every path no route claims.
    pub frontend_dir: PathBuf,
    /// `(url_prefix, directory)` for locally stored gallery files.
    pub uploads: Option<(String, PathBuf)>,
    pub max_upload_bytes: usize,
    /// Adds `Secure` to the session cookie; on when served over https.
    pub secure_cookies: bool,
    /// Cross-origin frontends allowed to call the API with credentials.
    pub cors_origins: Vec<String>,
    pub owner_name: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            frontend_dir: PathBuf::from("frontend/dist"),
            uploads: None,
            max_upload_bytes: 100 * 1024 * 1024,
            secure_cookies: false,
            cors_origins: Vec::new(),
            owner_name: "Portfolio".to_string(),
        }
    }
}

/// State shared across all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub messages: Arc<MessageService>,
    pub media: Arc<MediaService>,
    pub sessions: Arc<SessionManager>,
    pub store: Arc<dyn StoreHealth>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
    pub http: Arc<HttpSettings>,
}
