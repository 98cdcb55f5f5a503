//! HTTP server wiring for magnetdav
//!
//! The JSON API is open; the WebDAV tree sits behind the optional basic
//! authentication gate.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::header;
use axum::middleware;
use axum::routing::{any, delete, get};
use magnetdav_core::config::AuthConfig;
use magnetdav_core::{LifecycleManager, MagnetdavConfig, StreamingHandler};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{
    api_add_magnet, api_health, api_magnet_files, api_magnets, api_remove_magnet, api_stats,
    dav_cors, require_basic_auth, webdav_content, webdav_file, webdav_root,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: LifecycleManager,
    pub streaming: Arc<StreamingHandler>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(manager: LifecycleManager, config: &MagnetdavConfig) -> Self {
        Self {
            streaming: Arc::new(StreamingHandler::new(manager.clone(), &config.streaming)),
            auth: Arc::new(config.auth.clone()),
            manager,
        }
    }
}

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(api_health))
        .route("/api/magnets", get(api_magnets).post(api_add_magnet))
        .route("/api/magnets/{id}", delete(api_remove_magnet))
        .route("/api/magnets/{id}/files", get(api_magnet_files))
        .route("/api/stats", get(api_stats))
        .layer(cors_layer());

    // CorsLayer answers every OPTIONS itself, so WebDAV sets its own headers
    let webdav = Router::new()
        .route("/webdav", any(webdav_root))
        .route("/webdav/", any(webdav_root))
        .route("/webdav/{id}", any(webdav_content))
        .route("/webdav/{id}/", any(webdav_content))
        .route("/webdav/{id}/{*path}", any(webdav_file))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ))
        .layer(middleware::from_fn(dav_cors));

    Router::new()
        .merge(api)
        .merge(webdav)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::ETAG,
        ])
}

/// Serves until `shutdown` resolves, then shuts the lifecycle manager down.
///
/// # Errors
///
/// - `MagnetdavError::Io` - If the listener cannot be bound or the server fails
pub async fn run_server<F>(
    config: &MagnetdavConfig,
    manager: LifecycleManager,
    shutdown: F,
) -> magnetdav_core::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(manager.clone(), config);
    let app = build_router(state);

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    info!("magnetdav running on http://{}", listener.local_addr()?);
    info!("WebDAV root: http://{}/webdav/", listener.local_addr()?);
    if config.auth.enabled {
        info!(
            "WebDAV authentication enabled (username: {})",
            config.auth.username
        );
    }

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    manager.shutdown();
    info!("Server stopped");
    served?;
    Ok(())
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
