//! Range requests, conditional requests and HEAD against streamed files.

use axum::body::Body;
use axum::http::{Method, StatusCode, header};
use magnetdav_core::{ContentId, MagnetdavConfig};

use crate::harness::{
    MOVIE_ID, MOVIE_PATH, STALLED_ID, TestServer, body_bytes, file_uri, magnet,
    movie_bytes, request,
};

fn range_request(range: &str) -> axum::http::Request<Body> {
    request(Method::GET, &file_uri(MOVIE_ID, MOVIE_PATH))
        .header(header::RANGE, range)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_first_byte_range_returns_one_byte() {
    let server = TestServer::ready().await;

    let response = server.send(range_request("bytes=0-0")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-0/100");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1");
    assert_eq!(body_bytes(response).await, [0u8]);
}

#[tokio::test]
async fn test_no_range_returns_whole_file() {
    let server = TestServer::ready().await;

    let response = server.get(&file_uri(MOVIE_ID, MOVIE_PATH)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(headers[header::CONTENT_LENGTH], "100");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=86400");
    assert!(headers.get(header::CONTENT_RANGE).is_none());
    assert_eq!(body_bytes(response).await, movie_bytes());
}

#[tokio::test]
async fn test_open_ended_and_clamped_ranges() {
    let server = TestServer::ready().await;

    let response = server.send(range_request("bytes=90-")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 90-99/100");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=1800"
    );
    assert_eq!(body_bytes(response).await, &movie_bytes()[90..]);

    let response = server.send(range_request("bytes=95-5000")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 95-99/100");
    assert_eq!(body_bytes(response).await, &movie_bytes()[95..]);
}

#[tokio::test]
async fn test_unparsable_range_serves_whole_file() {
    let server = TestServer::ready().await;

    let response = server.send(range_request("bytes=abc-")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.len(), 100);
}

#[tokio::test]
async fn test_range_past_end_is_unsatisfiable() {
    let server = TestServer::ready().await;

    let response = server.send(range_request("bytes=100-")).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */100");
}

#[tokio::test]
async fn test_repeat_with_validator_is_not_modified() {
    let server = TestServer::ready().await;

    let first = server.send(range_request("bytes=10-19")).await;
    assert_eq!(first.status(), StatusCode::PARTIAL_CONTENT);
    let etag = first.headers()[header::ETAG].clone();

    let repeat = request(Method::GET, &file_uri(MOVIE_ID, MOVIE_PATH))
        .header(header::RANGE, "bytes=10-19")
        .header(header::IF_NONE_MATCH, etag.clone())
        .body(Body::empty())
        .unwrap();
    let second = server.send(repeat).await;

    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(second.headers()[header::ETAG], etag);
    assert!(body_bytes(second).await.is_empty());

    // A different span carries a different validator
    let other_span = request(Method::GET, &file_uri(MOVIE_ID, MOVIE_PATH))
        .header(header::RANGE, "bytes=20-29")
        .header(header::IF_NONE_MATCH, etag)
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        server.send(other_span).await.status(),
        StatusCode::PARTIAL_CONTENT
    );
}

#[tokio::test]
async fn test_head_reports_length_without_body() {
    let server = TestServer::ready().await;

    let response = server
        .send(
            request(Method::HEAD, &file_uri(MOVIE_ID, MOVIE_PATH))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
    assert!(response.headers().contains_key(header::ETAG));
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_percent_encoded_nested_path() {
    let server = TestServer::ready().await;

    let response = server
        .get(&file_uri(MOVIE_ID, "Extras/behind%20the%20scenes.mkv"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/x-matroska");
    assert_eq!(body_bytes(response).await, vec![9u8; 10]);
}

#[tokio::test]
async fn test_missing_content_and_files_are_not_found() {
    let server = TestServer::ready().await;

    let unknown_content = server
        .get(&file_uri("ffffffffffffffffffffffffffffffffffffffff", MOVIE_PATH))
        .await;
    assert_eq!(unknown_content.status(), StatusCode::NOT_FOUND);

    let unknown_file = server.get(&file_uri(MOVIE_ID, "missing.mkv")).await;
    assert_eq!(unknown_file.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_without_metadata_is_not_streamable() {
    let mut config = MagnetdavConfig::for_testing();
    config.swarm.metadata_timeout = std::time::Duration::from_secs(30);
    let server = TestServer::new(config);

    server.manager.submit(&magnet(STALLED_ID)).await.unwrap();
    let response = server.get(&file_uri(STALLED_ID, MOVIE_PATH)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.manager.shutdown();
    server.manager.settled().await;
}

#[tokio::test]
async fn test_access_is_counted() {
    let server = TestServer::ready().await;

    let unsatisfiable = server.send(range_request("bytes=500-")).await;
    assert_eq!(unsatisfiable.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    server.get(&file_uri(MOVIE_ID, MOVIE_PATH)).await;
    server.send(range_request("bytes=0-0")).await;

    // Access updates run in the background
    let mut count = 0;
    for _ in 0..50 {
        count = access_count(&server).await;
        if count >= 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(count, 2);

    // The rejected range never lands late
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(access_count(&server).await, 2);
}

async fn access_count(server: &TestServer) -> u64 {
    server
        .manager
        .catalog()
        .get_record(&ContentId::new(MOVIE_ID))
        .await
        .unwrap()
        .unwrap()
        .access_count
}
