//! JSON API: submit, list, files, stats and removal.

use axum::body::Body;
use axum::http::{Method, StatusCode, header};
use futures::future::join_all;
use magnetdav_core::MagnetdavConfig;
use serde_json::json;

use crate::harness::{
    MOVIE_ID, MOVIE_PATH, TestServer, body_json, file_uri, magnet, request,
};

fn submit_request(uri: &str) -> axum::http::Request<Body> {
    request(Method::POST, "/api/magnets")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "magnet_uri": uri }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_auth_mode() {
    let server = TestServer::new(MagnetdavConfig::for_testing());

    let response = server.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["auth"], false);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_submit_then_browse_and_stream() {
    let server = TestServer::new(MagnetdavConfig::for_testing());

    let response = server.send(submit_request(&magnet(MOVIE_ID))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let record = body_json(response).await;
    assert_eq!(record["id"], MOVIE_ID);
    assert_eq!(record["status"], "pending");
    assert_eq!(record["name"], "Sample Movie");

    server.manager.settled().await;

    let listed = body_json(server.get("/api/magnets").await).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["status"], "ready");
    assert_eq!(listed[0]["file_count"], 2);
    assert_eq!(listed[0]["total_size"], 110);

    let files = body_json(server.get(&format!("/api/magnets/{MOVIE_ID}/files")).await).await;
    let paths: Vec<_> = files
        .as_array()
        .unwrap()
        .iter()
        .map(|file| (file["path"].as_str().unwrap(), file["file_index"].as_u64().unwrap()))
        .collect();
    assert_eq!(
        paths,
        [(MOVIE_PATH, 0), ("Extras/behind the scenes.mkv", 1)]
    );
    assert_eq!(files[0]["media_type"], "video/mp4");

    let streamed = server.get(&file_uri(MOVIE_ID, MOVIE_PATH)).await;
    assert_eq!(streamed.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_resubmission_returns_existing_record() {
    let server = TestServer::ready().await;

    let response = server.send(submit_request(&magnet(MOVIE_ID))).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let record = body_json(response).await;
    assert_eq!(record["status"], "ready");
    assert_eq!(server.swarm.acquisition_count(), 1);
}

#[tokio::test]
async fn test_empty_magnet_uri_is_rejected() {
    let server = TestServer::new(MagnetdavConfig::for_testing());

    let empty = server.send(submit_request("   ")).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    let body = body_json(empty).await;
    assert!(body["error"].as_str().unwrap().contains("magnet_uri"));

    let missing = server
        .send(
            request(Method::POST, "/api/magnets")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_submissions() {
    let server = TestServer::new(MagnetdavConfig::for_testing());
    let ids: Vec<String> = (0..8).map(|i| format!("{i:040x}")).collect();

    let responses = join_all(ids.iter().map(|id| server.send(submit_request(&magnet(id))))).await;
    for response in responses {
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let listed = body_json(server.get("/api/magnets").await).await;
    assert_eq!(listed.as_array().unwrap().len(), 8);

    server.manager.shutdown();
    server.manager.settled().await;
}

#[tokio::test]
async fn test_stats_and_removal() {
    let server = TestServer::ready().await;

    let stats = body_json(server.get("/api/stats").await).await;
    assert_eq!(
        stats,
        json!({ "total_magnets": 1, "total_files": 2, "active_torrents": 1 })
    );

    let removed = server
        .send(
            request(Method::DELETE, &format!("/api/magnets/{MOVIE_ID}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(removed.status(), StatusCode::OK);
    assert_eq!(server.swarm.open_session_count(), 0);

    let stats = body_json(server.get("/api/stats").await).await;
    assert_eq!(
        stats,
        json!({ "total_magnets": 0, "total_files": 0, "active_torrents": 0 })
    );

    let again = server
        .send(
            request(Method::DELETE, &format!("/api/magnets/{MOVIE_ID}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let files = server.get(&format!("/api/magnets/{MOVIE_ID}/files")).await;
    assert_eq!(files.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        server.get(&file_uri(MOVIE_ID, MOVIE_PATH)).await.status(),
        StatusCode::NOT_FOUND
    );
}
