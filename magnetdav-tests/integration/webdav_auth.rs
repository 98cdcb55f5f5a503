//! Basic authentication on the WebDAV tree.

use axum::body::Body;
use axum::http::{Method, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use magnetdav_core::MagnetdavConfig;

use crate::harness::{MOVIE_ID, MOVIE_PATH, TestServer, body_bytes, file_uri, magnet, request};

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
}

async fn secured_server() -> TestServer {
    let mut config = MagnetdavConfig::for_testing();
    config.auth.enabled = true;
    config.auth.username = "viewer".to_string();
    config.auth.password = "hunter2".to_string();

    let server = TestServer::new(config);
    server.manager.submit(&magnet(MOVIE_ID)).await.unwrap();
    server.manager.settled().await;
    server
}

fn file_request(authorization: Option<String>) -> axum::http::Request<Body> {
    let mut builder = request(Method::GET, &file_uri(MOVIE_ID, MOVIE_PATH));
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_missing_credentials_are_challenged() {
    let server = secured_server().await;

    let response = server.send(file_request(None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        "Basic realm=\"magnetdav\""
    );
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_wrong_credentials_are_rejected() {
    let server = secured_server().await;

    let wrong_password = server.send(file_request(Some(basic("viewer", "nope")))).await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);

    let garbage = server
        .send(file_request(Some("Basic not-base64!".to_string())))
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_credentials_stream_the_file() {
    let server = secured_server().await;

    let response = server
        .send(file_request(Some(basic("viewer", "hunter2"))))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.len(), 100);
}

#[tokio::test]
async fn test_api_and_preflight_stay_open() {
    let server = secured_server().await;

    assert_eq!(server.get("/api/magnets").await.status(), StatusCode::OK);
    assert_eq!(server.get("/health").await.status(), StatusCode::OK);

    let options = server
        .send(
            request(Method::OPTIONS, &format!("/webdav/{MOVIE_ID}/"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(options.status(), StatusCode::OK);
    assert_eq!(options.headers()["dav"], "1");
}
