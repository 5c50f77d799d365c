//! HLS playlist rewriting.
//!
//! Line-oriented: tags and comments pass through, media and key references
//! are resolved against the effective base URL (the final URL after
//! upstream redirects) and wrapped into proxy URLs. A reference that fails
//! to resolve is left untouched rather than dropped; corrupting the
//! manifest is worse than leaving one unresolved line.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Encode set for URLs embedded as query parameter values: everything but
/// RFC 3986 unreserved characters.
pub const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a string for use as a query parameter value.
#[must_use]
pub fn encode_query_value(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_VALUE).to_string()
}

/// True when a URL path names an HLS playlist.
#[must_use]
pub fn is_manifest_path(path: &str) -> bool {
    let path = path.to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// Manifest detection over both the requested and post-redirect URL plus
/// the origin's content type. Origins routinely mislabel playlists, so any
/// of the three signals is enough.
#[must_use]
pub fn is_manifest_response(requested: &Url, effective: &Url, content_type: Option<&str>) -> bool {
    if is_manifest_path(requested.path()) || is_manifest_path(effective.path()) {
        return true;
    }
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("mpegurl"))
        .unwrap_or(false)
}

/// Rewrite every resolvable reference in a playlist into a proxy URL.
///
/// `proxy_url_for` wraps an absolute URL into a proxy URL (token-bearing
/// or raw, depending on the entry point); returning `None` leaves the
/// reference as it was.
pub fn rewrite_playlist<F>(manifest: &str, effective_base: &Url, mut proxy_url_for: F) -> String
where
    F: FnMut(&Url) -> Option<String>,
{
    let mut output = String::with_capacity(manifest.len() * 2);
    for line in manifest.lines() {
        output.push_str(&rewrite_line(line, effective_base, &mut proxy_url_for));
        output.push('\n');
    }
    output
}

fn rewrite_line<F>(line: &str, base: &Url, proxy_url_for: &mut F) -> String
where
    F: FnMut(&Url) -> Option<String>,
{
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return line.to_string();
    }

    if trimmed.starts_with('#') {
        // Key and media-init tags embed their reference as URI="...".
        if line.contains("URI=\"") {
            return rewrite_uri_attributes(line, base, proxy_url_for);
        }
        return line.to_string();
    }

    // Media or sub-playlist reference.
    match resolve_reference(trimmed, base).and_then(|absolute| proxy_url_for(&absolute)) {
        Some(proxied) => proxied,
        None => line.to_string(),
    }
}

/// Resolve a playlist reference to an absolute URL.
///
/// Already-absolute URLs parse as-is; `join` resolves leading-slash
/// references against the scheme+host and everything else relative to the
/// base path.
fn resolve_reference(reference: &str, base: &Url) -> Option<Url> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Url::parse(reference).ok();
    }
    base.join(reference).ok()
}

/// Rewrite every `URI="..."` attribute value in a tag line. An occurrence
/// that fails to resolve keeps its original value.
fn rewrite_uri_attributes<F>(line: &str, base: &Url, proxy_url_for: &mut F) -> String
where
    F: FnMut(&Url) -> Option<String>,
{
    const MARKER: &str = "URI=\"";

    let mut result = String::with_capacity(line.len());
    let mut remaining = line;

    while let Some(start) = remaining.find(MARKER) {
        let value_start = start + MARKER.len();
        result.push_str(&remaining[..value_start]);
        remaining = &remaining[value_start..];

        let Some(end) = remaining.find('"') else {
            // Unterminated attribute; emit the rest untouched.
            result.push_str(remaining);
            return result;
        };

        let uri = &remaining[..end];
        match resolve_reference(uri, base).and_then(|absolute| proxy_url_for(&absolute)) {
            Some(proxied) => result.push_str(&proxied),
            None => result.push_str(uri),
        }
        result.push('"');
        remaining = &remaining[end + 1..];
    }

    result.push_str(remaining);
    result
}

/// Truncate a media playlist to a preview window.
///
/// Keeps leading segments while the running `#EXTINF` duration stays
/// within `max_seconds` (always at least one segment), then terminates the
/// playlist with `#EXT-X-ENDLIST`. Master playlists (no `#EXTINF`) pass
/// through unchanged; their children are clamped when fetched.
#[must_use]
pub fn clamp_preview(manifest: &str, max_seconds: f64) -> String {
    if !manifest.contains("#EXTINF") {
        return manifest.to_string();
    }

    let mut output = String::with_capacity(manifest.len());
    let mut elapsed = 0.0_f64;
    let mut lines = manifest.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed == "#EXT-X-ENDLIST" {
            break;
        }

        if let Some(rest) = trimmed.strip_prefix("#EXTINF:") {
            let duration = rest
                .split(',')
                .next()
                .and_then(|d| d.trim().parse::<f64>().ok())
                .unwrap_or(0.0);
            if elapsed > 0.0 && elapsed + duration > max_seconds {
                break;
            }
            elapsed += duration;

            output.push_str(line);
            output.push('\n');
            // Copy through to and including the segment line this EXTINF
            // describes.
            for segment_line in lines.by_ref() {
                output.push_str(segment_line);
                output.push('\n');
                let t = segment_line.trim();
                if !t.is_empty() && !t.starts_with('#') {
                    break;
                }
            }
            continue;
        }

        output.push_str(line);
        output.push('\n');
    }

    output.push_str("#EXT-X-ENDLIST\n");
    output
}
