//! WebDAV handlers: range streaming, directory listings, PROPFIND and OPTIONS
//!
//! Each route accepts any method and dispatches on it, so unsupported
//! methods get a 405 with an `Allow` header instead of a routing miss.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use magnetdav_core::streaming::{ByteRangeRequest, StreamRequest};
use magnetdav_core::{ContentId, StreamingError};
use tracing::debug;

use crate::error::{DAV_ALLOW, WebError};
use crate::render::{DavResource, content_listing_html, multistatus, root_listing_html};
use crate::server::AppState;

const PROPFIND: &str = "PROPFIND";

const CORS_ALLOW_HEADERS: &str = "Authorization, Content-Type, Depth, If-None-Match, Range";
const CORS_EXPOSE_HEADERS: &str = "Accept-Ranges, Content-Length, Content-Range, ETag";

/// How far a PROPFIND descends below the requested resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Resource,
    Children,
}

fn propfind_depth(headers: &HeaderMap) -> Depth {
    match headers.get("depth").and_then(|value| value.to_str().ok()) {
        Some("0") => Depth::Resource,
        // "1", "infinity" and a missing header all list direct children
        _ => Depth::Children,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn content_id(raw: &str) -> ContentId {
    ContentId::new(raw.to_lowercase())
}

/// `/webdav` and `/webdav/`: every content record as a collection.
///
/// # Errors
///
/// - `WebError::Catalog` - If the catalog cannot be read
/// - `WebError::MethodNotAllowed` - For methods other than GET, HEAD, PROPFIND and OPTIONS
pub async fn webdav_root(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    match method.as_str() {
        "GET" | "HEAD" => {
            let records = state.manager.catalog().list_records().await?;
            Ok(Html(root_listing_html(&records)).into_response())
        }
        PROPFIND => {
            let mut resources = vec![DavResource::root(Utc::now())];
            if propfind_depth(&headers) == Depth::Children {
                let records = state.manager.catalog().list_records().await?;
                resources.extend(records.iter().map(DavResource::collection));
            }
            Ok(multistatus_response(&resources))
        }
        "OPTIONS" => Ok(options_response()),
        _ => Err(WebError::MethodNotAllowed { method }),
    }
}

/// `/webdav/{id}`: the file collection of one content record.
///
/// # Errors
///
/// - `WebError::Streaming` - If no record exists for the id or the catalog cannot be read
/// - `WebError::MethodNotAllowed` - For methods other than GET, HEAD, PROPFIND and OPTIONS
pub async fn webdav_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let id = content_id(&id);
    match method.as_str() {
        "GET" | "HEAD" => {
            let listing = state.streaming.directory_listing(&id).await?;
            Ok(Html(content_listing_html(&listing)).into_response())
        }
        PROPFIND => {
            let listing = state.streaming.directory_listing(&id).await?;
            let mut resources = vec![DavResource::collection(&listing.record)];
            if propfind_depth(&headers) == Depth::Children {
                resources.extend(
                    listing
                        .entries
                        .iter()
                        .map(|entry| DavResource::file(&entry.file)),
                );
            }
            Ok(multistatus_response(&resources))
        }
        "OPTIONS" => Ok(options_response()),
        _ => Err(WebError::MethodNotAllowed { method }),
    }
}

/// `/webdav/{id}/{*path}`: one file, streamed with range and cache support.
///
/// # Errors
///
/// - `WebError::Streaming` - If the content or file is unknown, not ready, or
///   the range cannot be satisfied
/// - `WebError::MethodNotAllowed` - For methods other than GET, HEAD, PROPFIND and OPTIONS
pub async fn webdav_file(
    State(state): State<AppState>,
    Path((id, path)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let id = content_id(&id);
    match method.as_str() {
        "GET" | "HEAD" => {
            let range = header_str(&headers, header::RANGE).and_then(ByteRangeRequest::parse);
            debug!("{} {}/{} range={:?}", method, id, path, range);

            let request = StreamRequest {
                content_id: id,
                path,
                range,
                if_none_match: header_str(&headers, header::IF_NONE_MATCH).map(str::to_string),
                head_only: method == Method::HEAD,
            };
            Ok(state.streaming.serve(request).await?)
        }
        PROPFIND => {
            let listing = state.streaming.directory_listing(&id).await?;
            let wanted = path.trim_matches('/');
            let entry = listing
                .entries
                .iter()
                .find(|entry| entry.file.path == wanted)
                .ok_or_else(|| StreamingError::FileNotFound {
                    id: id.clone(),
                    path: wanted.to_string(),
                })?;
            Ok(multistatus_response(&[DavResource::file(&entry.file)]))
        }
        "OPTIONS" => Ok(options_response()),
        _ => Err(WebError::MethodNotAllowed { method }),
    }
}

/// Adds cross-origin headers to every WebDAV response, including 401s.
pub async fn dav_cors(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(DAV_ALLOW),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(CORS_EXPOSE_HEADERS),
    );
    response
}

fn multistatus_response(resources: &[DavResource]) -> Response {
    Response::builder()
        .status(StatusCode::MULTI_STATUS)
        .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
        .header("dav", "1")
        .body(Body::from(multistatus(resources)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn options_response() -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert("dav", HeaderValue::from_static("1"));
    headers.insert(header::ALLOW, HeaderValue::from_static(DAV_ALLOW));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propfind_depth() {
        let mut headers = HeaderMap::new();
        assert_eq!(propfind_depth(&headers), Depth::Children);

        headers.insert("depth", HeaderValue::from_static("0"));
        assert_eq!(propfind_depth(&headers), Depth::Resource);

        headers.insert("depth", HeaderValue::from_static("infinity"));
        assert_eq!(propfind_depth(&headers), Depth::Children);
    }

    #[test]
    fn test_options_advertises_dav() {
        let response = options_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["dav"], "1");
        assert_eq!(response.headers()[header::ALLOW], DAV_ALLOW);
    }

    #[test]
    fn test_content_id_is_case_insensitive() {
        assert_eq!(content_id("ABCDEF").as_str(), "abcdef");
    }
}
