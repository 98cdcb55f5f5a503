//! HTTP error mapping for handlers.

use axum::Json;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use magnetdav_core::{CatalogError, ContentId, LifecycleError, StreamingError, SwarmError};
use serde_json::json;
use tracing::error;

/// Methods answered on WebDAV routes.
pub const DAV_ALLOW: &str = "OPTIONS, GET, HEAD, PROPFIND";

/// Errors surfaced by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Streaming(#[from] StreamingError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Content {id} not found")]
    ContentNotFound { id: ContentId },

    #[error("Invalid request: {reason}")]
    BadRequest { reason: String },

    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: Method },
}

impl WebError {
    /// Status code sent for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Streaming(StreamingError::NotFound { .. })
            | WebError::Streaming(StreamingError::NotReady { .. })
            | WebError::Streaming(StreamingError::FileNotFound { .. })
            | WebError::ContentNotFound { .. } => StatusCode::NOT_FOUND,
            WebError::Streaming(StreamingError::RangeNotSatisfiable { .. }) => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            WebError::Streaming(StreamingError::Swarm(SwarmError::SessionClosed { .. }))
            | WebError::Lifecycle(LifecycleError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            WebError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            WebError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            WebError::Streaming(_) | WebError::Lifecycle(_) | WebError::Catalog(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "Service unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        match self {
            WebError::Streaming(StreamingError::RangeNotSatisfiable { total, .. }) => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{total}")) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
            }
            WebError::MethodNotAllowed { .. } => {
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(DAV_ALLOW));
            }
            _ => {}
        }
        response
    }
}
