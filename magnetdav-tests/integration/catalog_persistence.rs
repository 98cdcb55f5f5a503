//! Catalog state surviving a restart of the server.

use std::time::Duration;

use axum::http::StatusCode;
use magnetdav_core::{MagnetdavConfig, SqliteCatalog};
use tempfile::TempDir;
use tokio_test::assert_ok;

use crate::harness::{MOVIE_ID, MOVIE_PATH, TestServer, body_bytes, body_json, file_uri, magnet};

fn open(dir: &TempDir) -> SqliteCatalog {
    assert_ok!(SqliteCatalog::open(
        &dir.path().join("catalog.db"),
        Duration::from_secs(1)
    ))
}

#[tokio::test]
async fn test_restart_recovers_ready_content() {
    let dir = TempDir::new().unwrap();

    {
        let server = TestServer::with_catalog(MagnetdavConfig::for_testing(), open(&dir));
        assert_ok!(server.manager.submit(&magnet(MOVIE_ID)).await);
        server.manager.settled().await;
        server.manager.shutdown();
    }

    let server = TestServer::with_catalog(MagnetdavConfig::for_testing(), open(&dir));

    // The record is known before any session exists
    let listed = body_json(server.get("/api/magnets").await).await;
    assert_eq!(listed[0]["status"], "ready");
    assert_eq!(
        server.get(&file_uri(MOVIE_ID, MOVIE_PATH)).await.status(),
        StatusCode::NOT_FOUND
    );

    assert_eq!(assert_ok!(server.manager.recover().await), 1);
    server.manager.settled().await;

    let response = server.get(&file_uri(MOVIE_ID, MOVIE_PATH)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.len(), 100);

    let files = body_json(server.get(&format!("/api/magnets/{MOVIE_ID}/files")).await).await;
    assert_eq!(files.as_array().unwrap().len(), 2);
}
