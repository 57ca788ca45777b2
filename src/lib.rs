use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
    middleware::from_fn_with_state,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Collaborator seams: sessions, forum data, controllers, views, storage, extension hooks.
pub mod auth;
pub mod config;
pub mod controllers;
pub mod error;
pub mod forum;
pub mod hooks;
pub mod models;
pub mod storage;
pub mod views;

// Request handling: route tables, per-route middleware, handlers and the upload pipeline.
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod uploads;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use controllers::{ControllerState, DefaultControllers};
pub use error::ForumError;
pub use forum::{ForumState, MemoryForum};
pub use routes::RouteIndex;
pub use storage::{LocalFileStorage, MockStorageService, S3FileStorage, StorageState};
pub use uploads::UploadPipeline;
pub use views::{EmbeddedJsonRenderer, ViewState};

/// ApiDoc
///
/// OpenAPI document for the upload and helper endpoints. Controller routes are generated
/// from the route tables and are listed by `/debug/routes` in development instead.
/// Served at `<base>/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::upload_post, handlers::upload_thumb, handlers::upload_user_picture,
        handlers::upload_category_picture, handlers::upload_favicon, handlers::upload_logo,
        handlers::get_users_csv, handlers::get_moderators, handlers::get_recent_posts,
        handlers::get_templates_listing
    ),
    components(
        schemas(
            models::UserRecord, models::UploadedAsset, models::ProfilePictureResponse,
            models::ModeratorsResponse,
        )
    ),
    tags(
        (name = "forum-web", description = "Forum routing layer API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The collaborators every route can reach. Cloned per request; everything behind it is
/// shared and read-only apart from what the collaborators synchronize themselves.
#[derive(Clone)]
pub struct AppState {
    /// Forum data: users, categories, topics, posts.
    pub forum: ForumState,
    /// Page and API data for controller routes.
    pub controllers: ControllerState,
    /// HTML rendering for site and admin pages.
    pub views: ViewState,
    /// Upload validation and storage, with its configuration and hooks.
    pub uploads: Arc<UploadPipeline>,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for ForumState {
    fn from_ref(app_state: &AppState) -> ForumState {
        app_state.forum.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for Arc<UploadPipeline> {
    fn from_ref(app_state: &AppState) -> Arc<UploadPipeline> {
        app_state.uploads.clone()
    }
}

/// create_router
///
/// Mounts the route tables under the configured base path and wraps them in the
/// session, body-limit, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");
    let base = state.config.relative_path.clone();
    let index = Arc::new(RouteIndex::for_config(&state.config));

    tracing::debug!(
        routes = index.routes().len(),
        base = %base,
        "route tables mounted"
    );

    // 2. Routes: every table entry, in composition order, with its middleware chain.
    let base_router = index
        .into_router(&state)
        .merge(
            SwaggerUi::new(format!("{base}/swagger-ui"))
                .url(format!("{base}/api-docs/openapi.json"), ApiDoc::openapi()),
        )
        .fallback(handlers::not_found)
        .layer(Extension(index))
        // Session resolution runs before any route middleware.
        .layer(from_fn_with_state(state.clone(), auth::resolve_session))
        .layer(DefaultBodyLimit::max(state.config.uploads.body_limit_bytes))
        .with_state(state);

    // 3. Observability and correlation layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the `x-request-id` set by `SetRequestIdLayer`
/// so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
