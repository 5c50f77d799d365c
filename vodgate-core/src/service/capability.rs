//! Capability token issuance and validation.
//!
//! A capability token binds an origin URL to an access scope and expiry,
//! signed with the process-wide secret. Whoever holds a valid, unexpired
//! token can resolve exactly the bound URL at exactly the bound scope, so
//! the proxy hot path needs no database lookup. Tokens are never persisted
//! and cannot be revoked individually; the short TTL bounds the blast
//! radius of a leak.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::{Error, Result};

/// What a capability token entitles its holder to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    /// Unrestricted playback of the bound URL.
    Full,
    /// Playback clamped to the preview window.
    Preview,
}

impl AccessScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Preview => "preview",
        }
    }
}

/// Signed token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityClaims {
    /// Bound origin URL (absolute).
    pub url: String,
    /// Access scope the token was minted at.
    pub scope: AccessScope,
    /// Requesting user, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Content identifier, for correlating logs.
    pub cid: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl CapabilityClaims {
    /// Parse the bound origin URL back into a [`Url`].
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.url)
            .map_err(|e| Error::TokenInvalid(format!("bound URL does not parse: {e}")))
    }
}

/// Issues and validates capability tokens (HS256 over a shared secret).
#[derive(Clone)]
pub struct CapabilityTokenService {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    ttl: Duration,
}

impl std::fmt::Debug for CapabilityTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityTokenService")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CapabilityTokenService {
    /// Create a token service from the shared signing secret.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret)),
            decoding_key: Arc::new(DecodingKey::from_secret(secret)),
            ttl,
        }
    }

    /// Mint a token binding `origin_url` at `scope`.
    ///
    /// # Arguments
    /// * `origin_url` - Absolute upstream URL the token resolves to
    /// * `scope` - Access scope baked into the token
    /// * `subject` - Requesting user, if authenticated
    /// * `content_id` - Content identifier for log correlation
    pub fn issue(
        &self,
        origin_url: &Url,
        scope: AccessScope,
        subject: Option<&str>,
        content_id: &str,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = CapabilityClaims {
            url: origin_url.to_string(),
            scope,
            sub: subject.map(str::to_string),
            cid: content_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign capability token: {e}")))
    }

    /// Verify a token and recover its claims.
    pub fn validate(&self, token: &str) -> Result<CapabilityClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Expiry is the only revocation mechanism, so enforce it exactly.
        validation.leeway = 0;

        decode::<CapabilityClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::TokenInvalid(e.to_string()),
            })
    }
}
