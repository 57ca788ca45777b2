use std::sync::Arc;

use axum::{ServiceExt, extract::Request};
use forum_web::{
    AppState, DefaultControllers, EmbeddedJsonRenderer, LocalFileStorage, MemoryForum,
    S3FileStorage, UploadPipeline,
    config::{AppConfig, Env, StorageConfig},
    controllers::ControllerState,
    create_router,
    forum::ForumState,
    hooks::HookRegistry,
    storage::StorageState,
    views::ViewState,
};
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, collaborators, storage, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load().expect("FATAL: invalid configuration");

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "forum_web=debug,tower_http=info".into());

    // 3. Pretty output in development, JSON for log aggregation in production.
    match config.env {
        Env::Development => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Forum collaborators
    let forum = Arc::new(MemoryForum::new()) as ForumState;
    let controllers =
        Arc::new(DefaultControllers::new(forum.clone(), config.clone())) as ControllerState;
    let views = Arc::new(EmbeddedJsonRenderer) as ViewState;

    // 5. Storage Initialization
    let storage = match &config.storage {
        StorageConfig::Local {
            upload_dir,
            url_prefix,
        } => Arc::new(LocalFileStorage::new(upload_dir.clone(), url_prefix.clone())) as StorageState,
        StorageConfig::S3 {
            endpoint,
            region,
            access_key,
            secret_key,
            bucket,
            public_url,
        } => Arc::new(S3FileStorage::new(
            endpoint, region, access_key, secret_key, bucket, public_url,
        )) as StorageState,
    };
    storage
        .ensure_ready()
        .await
        .expect("FATAL: storage backend is not reachable");

    // 6. Upload pipeline. Plugins register their overrides on the registry before it is
    // handed over.
    let hooks = HookRegistry::new();
    let uploads = Arc::new(UploadPipeline::new(config.uploads.clone(), hooks, storage));

    let bind_addr = config.bind_addr.clone();
    let base = config.relative_path.clone();
    let app_state = AppState {
        forum,
        controllers,
        views,
        uploads,
        config,
    };

    // 7. Router and Server Startup. Trailing slashes are trimmed before routing.
    let app = NormalizePathLayer::trim_trailing_slash().layer(create_router(app_state));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: could not bind the listen address");

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}{base}/swagger-ui");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .await
        .expect("FATAL: server error");
}
