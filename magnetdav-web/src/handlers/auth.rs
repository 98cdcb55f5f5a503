//! Basic authentication gate for the WebDAV routes.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::server::AppState;

/// Challenge sent with every 401.
pub const AUTH_CHALLENGE: &str = "Basic realm=\"magnetdav\"";

/// Decodes a `Basic` authorization header into username and password.
pub fn decode_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Rejects requests without the configured credentials when auth is enabled.
///
/// `OPTIONS` passes through so browser preflights, which never carry
/// credentials, can succeed.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.enabled || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic)
        .is_some_and(|(username, password)| {
            username == state.auth.username && password == state.auth.password
        });

    if authorized {
        next.run(request).await
    } else {
        debug!("Rejected unauthenticated {} {}", request.method(), request.uri());
        (
            StatusCode::UNAUTHORIZED,
            [(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(AUTH_CHALLENGE),
            )],
        )
            .into_response()
    }
}
