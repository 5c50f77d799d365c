//! Resilient origin fetching and HLS rewriting for the delivery proxy.
//!
//! Used by the HTTP entry points in `vodgate-api`: the fetch engine talks
//! to third-party origins under fallback identities, the rewriter routes
//! playlist references back through the proxy, and the streamer normalizes
//! passthrough responses.

pub mod fetch;
pub mod identity;
pub mod rewrite;
pub mod stream;

pub use fetch::{FetchConfig, FetchEngine, FetchKind, FetchOutcome};
pub use rewrite::{
    clamp_preview, encode_query_value, is_manifest_path, is_manifest_response, rewrite_playlist,
};
pub use stream::{
    manifest_response, passthrough_response, preflight, streaming_response, UpstreamParts,
    HLS_CONTENT_TYPE,
};
