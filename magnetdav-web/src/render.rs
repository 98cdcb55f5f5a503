//! HTML directory listings and WebDAV multistatus bodies.

use chrono::{DateTime, Utc};
use magnetdav_core::content::file_name;
use magnetdav_core::streaming::DirectoryListing;
use magnetdav_core::streaming::cache::http_date;
use magnetdav_core::{ContentId, ContentRecord, ContentStatus, FileEntry};

const LISTING_STYLE: &str = "body { font-family: sans-serif; margin: 2em; }
        ul { list-style: none; padding: 0; }
        li { padding: 4px 0; }
        .size { color: #666; }
        .unavailable { color: #999; }
        .status { display: inline-block; padding: 4px 8px; border-radius: 4px; }
        .status-pending { background: #fff3cd; }
        .status-ready { background: #d4edda; }
        .status-error { background: #f8d7da; }
        .warning { margin: 1em 0; padding: 8px; background: #fff3cd; }";

/// Formats a byte count with binary units, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut divisor = UNIT;
    let mut exponent = 0;
    let mut scaled = bytes / UNIT;
    while scaled >= UNIT {
        divisor *= UNIT;
        exponent += 1;
        scaled /= UNIT;
    }
    format!(
        "{:.1} {}B",
        bytes as f64 / divisor as f64,
        PREFIXES[exponent]
    )
}

/// Escapes text for HTML and XML bodies.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encodes each segment of a relative path, keeping separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// URL of a content collection.
pub fn collection_href(id: &ContentId) -> String {
    format!("/webdav/{}/", urlencoding::encode(id.as_str()))
}

/// URL of one file inside a content collection.
pub fn file_href(id: &ContentId, path: &str) -> String {
    format!("{}{}", collection_href(id), encode_path(path))
}

fn status_label(status: ContentStatus) -> &'static str {
    match status {
        ContentStatus::Pending => "Preparing",
        ContentStatus::Ready => "Ready",
        ContentStatus::Error => "Error",
    }
}

fn display_title(record: &ContentRecord) -> &str {
    if record.name.is_empty() {
        record.id.as_str()
    } else {
        &record.name
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>
<html>
<head>
    <meta charset=\"UTF-8\">
    <title>{}</title>
    <style>
        {LISTING_STYLE}
    </style>
</head>
<body>
{body}
</body>
</html>",
        escape(title)
    )
}

/// Renders the file listing of one content record.
///
/// Files are shown without links until the record is ready.
pub fn content_listing_html(listing: &DirectoryListing) -> String {
    let record = &listing.record;
    let title = display_title(record);

    let mut body = format!(
        "<h1>Files - {}</h1>\n<div class=\"status status-{}\">Status: {}</div>\n",
        escape(title),
        record.status,
        status_label(record.status)
    );
    if let Some(reason) = &record.error_message {
        body.push_str(&format!("<p>{}</p>\n", escape(reason)));
    }
    if !record.is_ready() {
        body.push_str(
            "<div class=\"warning\">This content is still being prepared and its files \
             cannot be opened yet. Refresh the page later.</div>\n",
        );
    }

    body.push_str("<ul>\n");
    for entry in &listing.entries {
        let file = &entry.file;
        let size = format_size(file.size);
        if entry.accessible {
            body.push_str(&format!(
                "<li><a href=\"{}\">{}</a> <span class=\"size\">({})</span></li>\n",
                escape(&file_href(&record.id, &file.path)),
                escape(&file.path),
                size
            ));
        } else {
            body.push_str(&format!(
                "<li><span class=\"unavailable\">{}</span> <span class=\"size\">({})</span></li>\n",
                escape(&file.path),
                size
            ));
        }
    }
    body.push_str("</ul>\n<p><a href=\"/webdav/\">All content</a></p>");

    page(title, &body)
}

/// Renders the top-level listing of every content record.
pub fn root_listing_html(records: &[ContentRecord]) -> String {
    let mut body = String::from("<h1>Content</h1>\n<ul>\n");
    for record in records {
        body.push_str(&format!(
            "<li><a href=\"{}\">{}</a> <span class=\"status status-{}\">{}</span> \
             <span class=\"size\">({})</span></li>\n",
            escape(&collection_href(&record.id)),
            escape(display_title(record)),
            record.status,
            status_label(record.status),
            format_size(record.total_size)
        ));
    }
    body.push_str("</ul>");

    page("magnetdav", &body)
}

/// Kind of a WebDAV resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DavKind {
    Collection,
    File { size: u64, media_type: String },
}

/// One `<D:response>` entry of a multistatus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavResource {
    pub href: String,
    pub display_name: String,
    pub kind: DavKind,
    pub modified: DateTime<Utc>,
}

impl DavResource {
    /// The `/webdav/` collection itself.
    pub fn root(modified: DateTime<Utc>) -> Self {
        Self {
            href: "/webdav/".to_string(),
            display_name: "webdav".to_string(),
            kind: DavKind::Collection,
            modified,
        }
    }

    pub fn collection(record: &ContentRecord) -> Self {
        Self {
            href: collection_href(&record.id),
            display_name: display_title(record).to_string(),
            kind: DavKind::Collection,
            modified: record.updated_at,
        }
    }

    pub fn file(file: &FileEntry) -> Self {
        Self {
            href: file_href(&file.content_id, &file.path),
            display_name: file_name(&file.path).to_string(),
            kind: DavKind::File {
                size: file.size,
                media_type: file.media_type.clone(),
            },
            modified: file.updated_at,
        }
    }
}

/// Renders a `207 Multi-Status` body for the given resources.
pub fn multistatus(resources: &[DavResource]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<D:multistatus xmlns:D=\"DAV:\">\n",
    );
    for resource in resources {
        xml.push_str("  <D:response>\n");
        xml.push_str(&format!("    <D:href>{}</D:href>\n", escape(&resource.href)));
        xml.push_str("    <D:propstat>\n      <D:prop>\n");
        xml.push_str(&format!(
            "        <D:displayname>{}</D:displayname>\n",
            escape(&resource.display_name)
        ));
        match &resource.kind {
            DavKind::Collection => {
                xml.push_str("        <D:resourcetype><D:collection/></D:resourcetype>\n");
            }
            DavKind::File { size, media_type } => {
                xml.push_str("        <D:resourcetype/>\n");
                xml.push_str(&format!(
                    "        <D:getcontentlength>{size}</D:getcontentlength>\n"
                ));
                xml.push_str(&format!(
                    "        <D:getcontenttype>{}</D:getcontenttype>\n",
                    escape(media_type)
                ));
            }
        }
        xml.push_str(&format!(
            "        <D:getlastmodified>{}</D:getlastmodified>\n",
            http_date(resource.modified)
        ));
        xml.push_str("      </D:prop>\n      <D:status>HTTP/1.1 200 OK</D:status>\n");
        xml.push_str("    </D:propstat>\n  </D:response>\n");
    }
    xml.push_str("</D:multistatus>\n");
    xml
}
