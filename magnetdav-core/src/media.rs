//! Media type lookup for catalog entries and served files.

/// Types players expect for common container and subtitle formats.
const KNOWN_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("jpg", "image/jpeg"),
    ("png", "image/png"),
    ("srt", "text/plain"),
    ("ass", "text/plain"),
    ("ssa", "text/plain"),
];

const FALLBACK_TYPE: &str = "application/octet-stream";

/// Returns the media type for a file path based on its extension.
///
/// Streaming formats use a fixed table; anything else is guessed from the
/// extension and finally falls back to `application/octet-stream`.
pub fn media_type_for(path: &str) -> String {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if let Some((_, media_type)) = KNOWN_TYPES.iter().find(|(ext, _)| *ext == extension) {
        return (*media_type).to_string();
    }

    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_TYPE)
        .to_string()
}

/// Returns true for audio and video types.
pub fn is_media(media_type: &str) -> bool {
    media_type.starts_with("video/") || media_type.starts_with("audio/")
}

/// Value for the `Content-Type` header; text types are served as UTF-8.
pub fn served_content_type(media_type: &str) -> String {
    if media_type.starts_with("text/") && !media_type.contains("charset") {
        format!("{media_type}; charset=utf-8")
    } else {
        media_type.to_string()
    }
}
