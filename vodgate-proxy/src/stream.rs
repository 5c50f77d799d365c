//! Proxied response construction.
//!
//! Segments pass through with the origin's status and body stream; only
//! headers are normalized. Manifests are served from rewritten text and
//! never cached.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::fetch::FetchOutcome;

/// Content type for rewritten playlists.
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Segments are content-addressed by URL and effectively immutable.
const SEGMENT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
/// Manifests change with every rewrite and must never be cached.
const MANIFEST_CACHE_CONTROL: &str = "no-store";

/// Headers the player needs when it runs on a different origin than the
/// proxy.
const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, OPTIONS"),
    ("Access-Control-Allow-Headers", "*"),
];

/// The parts of an upstream response the streamer needs after the body has
/// been taken.
pub struct UpstreamParts {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub content_length: Option<HeaderValue>,
    pub content_range: Option<HeaderValue>,
    /// Path of the effective URL, for extension-based content typing.
    pub path: String,
}

impl UpstreamParts {
    #[must_use]
    pub fn from_response(effective_url: &Url, response: &reqwest::Response) -> Self {
        let headers = response.headers();
        Self {
            status: response.status(),
            content_type: headers.get(header::CONTENT_TYPE).cloned(),
            content_length: headers.get(header::CONTENT_LENGTH).cloned(),
            content_range: headers.get(header::CONTENT_RANGE).cloned(),
            path: effective_url.path().to_string(),
        }
    }
}

/// Build a passthrough response for a non-manifest body.
///
/// Status and body are forwarded verbatim; `Content-Length` and
/// `Content-Range` are propagated when present.
pub fn passthrough_response(parts: &UpstreamParts, body: Body) -> Result<Response, anyhow::Error> {
    let mut builder = Response::builder()
        .status(parts.status)
        .header(header::CONTENT_TYPE, segment_content_type(parts))
        .header(header::CACHE_CONTROL, SEGMENT_CACHE_CONTROL)
        .header(header::ACCEPT_RANGES, "bytes");

    for (name, value) in CORS_HEADERS {
        builder = builder.header(name, value);
    }

    if let Some(length) = &parts.content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    if let Some(range) = &parts.content_range {
        builder = builder.header(header::CONTENT_RANGE, range);
    }

    builder
        .body(body)
        .map_err(|e| anyhow::anyhow!("Failed to build passthrough response: {e}"))
}

/// Build the response for a rewritten playlist.
pub fn manifest_response(rewritten: String) -> Result<Response, anyhow::Error> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HLS_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, MANIFEST_CACHE_CONTROL)
        .header(header::ACCEPT_RANGES, "bytes");

    for (name, value) in CORS_HEADERS {
        builder = builder.header(name, value);
    }

    builder
        .body(Body::from(rewritten))
        .map_err(|e| anyhow::anyhow!("Failed to build manifest response: {e}"))
}

/// Build a passthrough response streaming an upstream body.
pub fn streaming_response(outcome: FetchOutcome) -> Result<Response, anyhow::Error> {
    let parts = UpstreamParts::from_response(&outcome.effective_url, &outcome.response);
    passthrough_response(&parts, Body::from_stream(outcome.response.bytes_stream()))
}

/// Preflight handler for the proxy entry points. Always succeeds, no
/// origin fetch.
#[allow(clippy::unused_async)]
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "GET, OPTIONS"),
            ("Access-Control-Allow-Headers", "*"),
            ("Access-Control-Max-Age", "86400"),
        ],
    )
}

/// Content type served for a segment response.
///
/// Origins frequently mislabel transport-stream segments as generic
/// binary, so a `.ts` path always wins over the reported type.
fn segment_content_type(parts: &UpstreamParts) -> HeaderValue {
    if parts.path.to_ascii_lowercase().ends_with(".ts") {
        return HeaderValue::from_static("video/mp2t");
    }

    parts
        .content_type
        .clone()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"))
}
