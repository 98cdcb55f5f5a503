//! Shared setup: a router over the simulated swarm and an in-memory catalog.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use magnetdav_core::swarm::{MetadataBehavior, SimulatedContent, SimulatedFile};
use magnetdav_core::{ContentId, LifecycleManager, MagnetdavConfig, SimulatedSwarm, SqliteCatalog};
use magnetdav_web::{AppState, build_router};
use tower::ServiceExt;

/// Identifier of the seeded sample content.
pub const MOVIE_ID: &str = "0123456789abcdef0123456789abcdef01234567";
/// Identifier registered with metadata that never arrives.
pub const STALLED_ID: &str = "feedfacefeedfacefeedfacefeedfacefeedface";

pub const MOVIE_PATH: &str = "movie.mp4";
pub const EXTRA_PATH: &str = "Extras/behind the scenes.mkv";

pub fn movie_bytes() -> Vec<u8> {
    (0..100u8).collect()
}

pub fn magnet(id: &str) -> String {
    format!("magnet:?xt=urn:btih:{id}&dn=Sample%20Movie")
}

pub struct TestServer {
    pub app: Router,
    pub manager: LifecycleManager,
    pub swarm: SimulatedSwarm,
}

impl TestServer {
    /// Server with seeded content but nothing submitted yet.
    pub fn new(config: MagnetdavConfig) -> Self {
        Self::with_catalog(config, SqliteCatalog::open_in_memory().unwrap())
    }

    pub fn with_catalog(config: MagnetdavConfig, catalog: SqliteCatalog) -> Self {
        let swarm = SimulatedSwarm::new();
        swarm.add_content(
            ContentId::new(MOVIE_ID),
            SimulatedContent::new("Sample Movie")
                .with_file(SimulatedFile::in_memory(MOVIE_PATH, movie_bytes()))
                .with_file(SimulatedFile::in_memory(EXTRA_PATH, vec![9u8; 10])),
        );
        swarm.add_content(
            ContentId::new(STALLED_ID),
            SimulatedContent::new("Stalled").with_metadata(MetadataBehavior::Never),
        );

        let manager = LifecycleManager::new(
            Arc::new(catalog),
            Arc::new(swarm.clone()),
            config.swarm.metadata_timeout,
        );
        let app = build_router(AppState::new(manager.clone(), &config));

        Self {
            app,
            manager,
            swarm,
        }
    }

    /// Server whose sample content has been submitted and is ready.
    pub async fn ready() -> Self {
        let server = Self::new(MagnetdavConfig::for_testing());
        server.manager.submit(&magnet(MOVIE_ID)).await.unwrap();
        server.manager.settled().await;
        server
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(request(Method::GET, uri).body(Body::empty()).unwrap())
            .await
    }
}

pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

pub fn file_uri(id: &str, encoded_path: &str) -> String {
    format!("/webdav/{id}/{encoded_path}")
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
