//! Proxy entry points.
//!
//! Two GET entries: a token-gated one for access-controlled playback and a
//! raw-URL one for public assets. Both follow the same path once the
//! origin URL is resolved: fetch under fallback identities, then either
//! rewrite (playlists) or stream through (segments). OPTIONS preflight is
//! handled separately and never touches an origin.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use url::Url;

use vodgate_core::service::{AccessScope, CapabilityClaims};
use vodgate_proxy::{
    clamp_preview, encode_query_value, is_manifest_path, is_manifest_response, manifest_response,
    passthrough_response, rewrite_playlist, streaming_response, FetchKind, UpstreamParts,
};

use crate::http::error::{AppError, AppResult};
use crate::http::AppState;

pub use vodgate_proxy::stream::preflight;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoQuery {
    url: Option<String>,
}

/// How rewritten playlist references are wrapped.
enum RewriteMode {
    /// Re-issue a capability token per reference, preserving the scope,
    /// subject and content id of the validated request token.
    Capability(CapabilityClaims),
    /// Public asset path: references are wrapped as encoded raw URLs.
    RawUrl,
}

/// GET /api/proxy/stream - token-gated playback entry
pub async fn proxy_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> AppResult<Response> {
    let Some(token) = query.token else {
        return Err(AppError::bad_request("missing token query parameter"));
    };

    let claims = state.tokens.validate(&token)?;
    let origin_url = claims.origin_url()?;

    tracing::debug!(
        content_id = %claims.cid,
        scope = claims.scope.as_str(),
        url = %origin_url,
        "token validated"
    );

    serve_proxied(&state, &headers, &origin_url, RewriteMode::Capability(claims)).await
}

/// GET /api/proxy/video - raw-URL entry for content without access control
pub async fn proxy_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VideoQuery>,
) -> AppResult<Response> {
    let Some(raw) = query.url.filter(|u| !u.is_empty()) else {
        return Ok((StatusCode::BAD_REQUEST, "missing url query parameter").into_response());
    };

    let origin_url = Url::parse(&raw)
        .map_err(|_| AppError::bad_request("url must be an absolute http(s) URL"))?;
    if !matches!(origin_url.scheme(), "http" | "https") {
        return Err(AppError::bad_request("url must be an absolute http(s) URL"));
    }

    serve_proxied(&state, &headers, &origin_url, RewriteMode::RawUrl).await
}

/// Fetch the origin and respond, rewriting playlists and streaming
/// everything else.
async fn serve_proxied(
    state: &AppState,
    headers: &HeaderMap,
    origin_url: &Url,
    mode: RewriteMode,
) -> AppResult<Response> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let kind = if is_manifest_path(origin_url.path()) {
        FetchKind::Manifest
    } else {
        FetchKind::Segment
    };

    let outcome = state.fetch_engine.fetch(origin_url, range, kind).await?;

    let content_type = outcome
        .response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !is_manifest_response(origin_url, &outcome.effective_url, content_type.as_deref()) {
        return streaming_response(outcome).map_err(Into::into);
    }

    // Playlist: buffer, rewrite, and serve as text.
    let effective_base = outcome.effective_url.clone();
    let parts = UpstreamParts::from_response(&effective_base, &outcome.response);
    let bytes = outcome
        .response
        .bytes()
        .await
        .map_err(|e| AppError::bad_gateway(format!("Failed to read manifest body: {e}")))?;

    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            // Wrong encoding; serving the original bytes beats failing hard.
            tracing::warn!(url = %origin_url, "manifest body is not valid UTF-8, serving as-is");
            return passthrough_response(&parts, Body::from(bytes)).map_err(Into::into);
        }
    };

    let public_base = state.config.server.public_base_url.trim_end_matches('/');
    let rewritten = match &mode {
        RewriteMode::Capability(claims) => {
            let text = if claims.scope == AccessScope::Preview {
                clamp_preview(&text, state.config.playback.preview_max_seconds as f64)
            } else {
                text
            };
            rewrite_playlist(&text, &effective_base, |absolute| {
                state
                    .tokens
                    .issue(absolute, claims.scope, claims.sub.as_deref(), &claims.cid)
                    .ok()
                    .map(|token| format!("{public_base}/api/proxy/stream?token={token}"))
            })
        }
        RewriteMode::RawUrl => rewrite_playlist(&text, &effective_base, |absolute| {
            Some(format!(
                "{public_base}/api/proxy/video?url={}",
                encode_query_value(absolute.as_str())
            ))
        }),
    };

    manifest_response(rewritten).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::create_router;
    use axum::body::Body as AxumBody;
    use axum::http::Request;
    use chrono::Duration;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use vodgate_core::Config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_state() -> AppState {
        let mut config = Config::default();
        config.tokens.secret = "test-signing-secret".to_string();
        config.server.public_base_url = "http://proxy.example".to_string();
        AppState::new(Arc::new(config)).unwrap()
    }

    async fn send(state: AppState, request: Request<AxumBody>) -> (StatusCode, HeaderMap, String) {
        let response = create_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, String::from_utf8_lossy(&body).into_owned())
    }

    fn get(uri: &str) -> Request<AxumBody> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(AxumBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_url_parameter_is_plain_400() {
        let (status, _, body) = send(test_state(), get("/api/proxy/video")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn test_preflight_succeeds_without_an_origin_fetch() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/proxy/stream")
            .body(AxumBody::empty())
            .unwrap();
        let (status, headers, _) = send(test_state(), request).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET, OPTIONS");
        assert_eq!(headers["access-control-max-age"], "86400");
    }

    #[tokio::test]
    async fn test_invalid_token_is_401_with_code() {
        let (status, _, body) = send(
            test_state(),
            get("/api/proxy/stream?token=not.a.token"),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("TOKEN_INVALID"));
    }

    #[tokio::test]
    async fn test_missing_token_is_400() {
        let (status, _, _) = send(test_state(), get("/api/proxy/stream")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_expired_token_is_401_expired() {
        let state = test_state();
        let expired_issuer = vodgate_core::service::CapabilityTokenService::new(
            b"test-signing-secret",
            Duration::seconds(-5),
        );
        let origin = Url::parse("http://origin.example/ep/index.m3u8").unwrap();
        let token = expired_issuer
            .issue(&origin, AccessScope::Full, None, "ep-1")
            .unwrap();

        let (status, _, body) =
            send(state, get(&format!("/api/proxy/stream?token={token}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("TOKEN_EXPIRED"));
    }

    #[tokio::test]
    async fn test_segment_passthrough_relabels_transport_stream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/seg0.ts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(vec![0x47, 0x00, 0x11]),
            )
            .mount(&server)
            .await;

        let url = encode_query_value(&format!("{}/media/seg0.ts", server.uri()));
        let (status, headers, _) =
            send(test_state(), get(&format!("/api/proxy/video?url={url}"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "video/mp2t");
        assert_eq!(headers["accept-ranges"], "bytes");
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(
            headers["cache-control"],
            "public, max-age=31536000, immutable"
        );
    }

    #[tokio::test]
    async fn test_raw_manifest_rewrite_matches_expected_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/path/index.m3u8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/vnd.apple.mpegurl")
                    .set_body_string(
                        "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\nseg0.ts\n",
                    ),
            )
            .mount(&server)
            .await;

        let origin_base = server.uri();
        let url = encode_query_value(&format!("{origin_base}/path/index.m3u8"));
        let (status, headers, body) =
            send(test_state(), get(&format!("/api/proxy/video?url={url}"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/vnd.apple.mpegurl");
        assert_eq!(headers["cache-control"], "no-store");

        let expected_key = format!(
            "URI=\"http://proxy.example/api/proxy/video?url={}\"",
            encode_query_value(&format!("{origin_base}/path/key.bin"))
        );
        let expected_segment = format!(
            "http://proxy.example/api/proxy/video?url={}",
            encode_query_value(&format!("{origin_base}/path/seg0.ts"))
        );
        assert!(body.contains(&expected_key), "body was: {body}");
        assert!(body.lines().any(|l| l == expected_segment), "body was: {body}");
    }

    #[tokio::test]
    async fn test_token_manifest_rewrite_reissues_tokens_at_the_same_scope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ep/index.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
                "#EXTM3U\n",
                "#EXTINF:60.0,\nseg0.ts\n",
                "#EXTINF:60.0,\nseg1.ts\n",
                "#EXTINF:60.0,\nseg2.ts\n",
                "#EXT-X-ENDLIST\n",
            )))
            .mount(&server)
            .await;

        let state = test_state();
        let origin = Url::parse(&format!("{}/ep/index.m3u8", server.uri())).unwrap();
        let token = state
            .tokens
            .issue(&origin, AccessScope::Preview, Some("user-1"), "ep-1")
            .unwrap();

        let (status, _, body) =
            send(state.clone(), get(&format!("/api/proxy/stream?token={token}"))).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.ends_with("#EXT-X-ENDLIST\n"));

        // Every rewritten reference carries a preview-scope token bound to
        // the resolved segment URL; the third segment is clamped away by
        // the 120s preview window.
        let mut segment_tokens = 0;
        for line in body.lines() {
            let Some(token) = line
                .strip_prefix("http://proxy.example/api/proxy/stream?token=")
            else {
                continue;
            };
            let claims = state.tokens.validate(token).unwrap();
            assert_eq!(claims.scope, AccessScope::Preview);
            assert_eq!(claims.sub.as_deref(), Some("user-1"));
            assert_eq!(claims.cid, "ep-1");
            assert!(claims.url.starts_with(&format!("{}/ep/seg", server.uri())));
            segment_tokens += 1;
        }
        assert_eq!(segment_tokens, 2);
    }

    #[tokio::test]
    async fn test_exhausted_origin_is_502() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let url = encode_query_value(&format!("{}/blocked.ts", server.uri()));
        let (status, _, body) =
            send(test_state(), get(&format!("/api/proxy/video?url={url}"))).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("UPSTREAM_EXHAUSTED"));
    }
}
