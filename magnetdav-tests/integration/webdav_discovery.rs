//! Directory listings, PROPFIND, OPTIONS and method handling.

use axum::body::Body;
use axum::http::{Method, StatusCode, header};
use magnetdav_core::MagnetdavConfig;

use crate::harness::{
    MOVIE_ID, MOVIE_PATH, STALLED_ID, TestServer, body_text, file_uri, magnet, request,
};

fn propfind(uri: &str, depth: Option<&str>) -> axum::http::Request<Body> {
    let mut builder = request(Method::from_bytes(b"PROPFIND").unwrap(), uri);
    if let Some(depth) = depth {
        builder = builder.header("depth", depth);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_ready_listing_links_files() {
    let server = TestServer::ready().await;

    let response = server.get(&format!("/webdav/{MOVIE_ID}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let html = body_text(response).await;
    assert!(html.contains("Sample Movie"));
    assert!(html.contains("status-ready"));
    assert!(html.contains(&format!("href=\"/webdav/{MOVIE_ID}/movie.mp4\"")));
    assert!(html.contains(&format!(
        "href=\"/webdav/{MOVIE_ID}/Extras/behind%20the%20scenes.mkv\""
    )));
}

#[tokio::test]
async fn test_pending_listing_has_no_links() {
    let mut config = MagnetdavConfig::for_testing();
    config.swarm.metadata_timeout = std::time::Duration::from_secs(30);
    let server = TestServer::new(config);
    server.manager.submit(&magnet(STALLED_ID)).await.unwrap();

    let html = body_text(server.get(&format!("/webdav/{STALLED_ID}/")).await).await;

    assert!(html.contains("status-pending"));
    assert!(html.contains("class=\"warning\""));
    assert!(!html.contains(&format!("href=\"/webdav/{STALLED_ID}/")));

    server.manager.shutdown();
    server.manager.settled().await;
}

#[tokio::test]
async fn test_root_lists_every_record() {
    let server = TestServer::ready().await;

    let html = body_text(server.get("/webdav/").await).await;

    assert!(html.contains(&format!("href=\"/webdav/{MOVIE_ID}/\"")));
    assert!(html.contains("Sample Movie"));
}

#[tokio::test]
async fn test_propfind_collection_depths() {
    let server = TestServer::ready().await;
    let uri = format!("/webdav/{MOVIE_ID}/");

    let shallow = server.send(propfind(&uri, Some("0"))).await;
    assert_eq!(shallow.status(), StatusCode::MULTI_STATUS);
    assert_eq!(shallow.headers()["dav"], "1");
    let xml = body_text(shallow).await;
    assert_eq!(xml.matches("<D:response>").count(), 1);
    assert!(xml.contains("<D:collection/>"));

    let deep = body_text(server.send(propfind(&uri, Some("1"))).await).await;
    assert_eq!(deep.matches("<D:response>").count(), 3);
    assert!(deep.contains("<D:getcontentlength>100</D:getcontentlength>"));
    assert!(deep.contains("<D:getcontenttype>video/mp4</D:getcontenttype>"));
    assert!(deep.contains(&format!(
        "<D:href>/webdav/{MOVIE_ID}/Extras/behind%20the%20scenes.mkv</D:href>"
    )));

    let root = body_text(server.send(propfind("/webdav", None)).await).await;
    assert_eq!(root.matches("<D:response>").count(), 2);
}

#[tokio::test]
async fn test_propfind_single_file() {
    let server = TestServer::ready().await;

    let response = server
        .send(propfind(&file_uri(MOVIE_ID, MOVIE_PATH), None))
        .await;
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let xml = body_text(response).await;
    assert_eq!(xml.matches("<D:response>").count(), 1);
    assert!(xml.contains("<D:displayname>movie.mp4</D:displayname>"));

    let missing = server
        .send(propfind(&file_uri(MOVIE_ID, "nope.mkv"), None))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_options_and_unsupported_methods() {
    let server = TestServer::ready().await;

    let options = server
        .send(
            request(Method::OPTIONS, &file_uri(MOVIE_ID, MOVIE_PATH))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(options.status(), StatusCode::OK);
    assert_eq!(options.headers()["dav"], "1");
    assert!(
        options.headers()[header::ALLOW]
            .to_str()
            .unwrap()
            .contains("PROPFIND")
    );

    let put = server
        .send(
            request(Method::PUT, &file_uri(MOVIE_ID, MOVIE_PATH))
                .body(Body::from("overwrite"))
                .unwrap(),
        )
        .await;
    assert_eq!(put.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(put.headers().contains_key(header::ALLOW));
}

#[tokio::test]
async fn test_unknown_collection_is_not_found() {
    let server = TestServer::ready().await;

    let response = server.get("/webdav/0000000000000000000000000000000000000000").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .send(propfind("/webdav/0000000000000000000000000000000000000000/", Some("1")))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
