//! Route table and the layer stack around it.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers::{admin, health, media, messages};
use crate::middleware::{require_store, security_headers};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let http = state.http.clone();

    // Everything that reads or writes the store checks it first.
    let data_routes = Router::new()
        .route("/messages", post(messages::submit))
        .route("/block_user/{token}", get(messages::block_user))
        .route("/fetch/media", get(media::list))
        .route("/admin/messages", get(admin::list_messages))
        .route("/admin/respond", post(admin::respond))
        .route("/admin/block", post(admin::block))
        .route("/admin/delete_message", post(admin::delete_message))
        .route("/admin/upload", post(media::upload))
        .route("/admin/edit_media", post(media::edit))
        .route("/admin/delete_media", post(media::delete))
        .route_layer(from_fn_with_state(state.clone(), require_store));

    let open_routes = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/admin/login", post(admin::login))
        .route("/admin/logout", post(admin::logout))
        .route("/admin/check-auth", get(admin::check_auth))
        .route("/admin/generate-signature", post(media::generate_signature))
        .route("/storage/{resource_type}/upload", post(media::signed_upload));

    let index = http.frontend_dir.join("index.html");
    let frontend = ServeDir::new(&http.frontend_dir).fallback(ServeFile::new(index));

    let mut app = Router::new().merge(data_routes).merge(open_routes);
    if let Some((prefix, dir)) = &http.uploads {
        app = app.nest_service(prefix, ServeDir::new(dir));
    }

    app.fallback_service(frontend)
        .layer(DefaultBodyLimit::max(http.max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors(&http.cors_origins))
                .layer(CompressionLayer::new())
                .layer(from_fn(security_headers)),
        )
        .with_state(state)
}

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return CorsLayer::new();
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}
