//! Playback URL issuance.
//!
//! The only component that talks to the entitlement seam. Callers (the
//! content-detail endpoint) hand it the candidate origin URLs for an
//! episode; it consults the entitlement resolver once, mints one capability
//! token per URL at the decided scope and returns token-bearing proxy URLs
//! for the player. The proxy hot path itself never touches entitlements.

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use super::capability::{AccessScope, CapabilityTokenService};
use crate::{Error, Result};

/// Entitlement decision for one (user, content, episode) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Full playback (free episode or entitled member).
    Full,
    /// Only the truncated preview may be served.
    PreviewOnly,
    /// No playback at all.
    Denied,
}

/// External entitlement resolver. Implemented outside this crate; the
/// delivery core only consumes the decision.
#[async_trait]
pub trait EntitlementResolver: Send + Sync {
    async fn resolve(
        &self,
        subject: Option<&str>,
        content_id: &str,
        episode: u32,
    ) -> Result<AccessDecision>;
}

/// Builds token-bearing playback URLs for the player.
#[derive(Clone)]
pub struct PlaybackUrlService {
    tokens: Arc<CapabilityTokenService>,
    public_base_url: String,
}

impl PlaybackUrlService {
    #[must_use]
    pub fn new(tokens: Arc<CapabilityTokenService>, public_base_url: impl Into<String>) -> Self {
        Self {
            tokens,
            public_base_url: public_base_url.into(),
        }
    }

    /// Resolve entitlement for an episode and mint one proxy URL per
    /// candidate origin URL.
    pub async fn playback_urls(
        &self,
        resolver: &dyn EntitlementResolver,
        subject: Option<&str>,
        content_id: &str,
        episode: u32,
        origin_urls: &[Url],
    ) -> Result<Vec<String>> {
        let decision = resolver.resolve(subject, content_id, episode).await?;
        let scope = match decision {
            AccessDecision::Full => AccessScope::Full,
            AccessDecision::PreviewOnly => AccessScope::Preview,
            AccessDecision::Denied => {
                return Err(Error::AccessDenied(format!(
                    "episode {episode} of {content_id} is not playable for this user"
                )));
            }
        };

        tracing::debug!(
            content_id,
            episode,
            scope = scope.as_str(),
            candidates = origin_urls.len(),
            "issuing playback URLs"
        );

        let base = self.public_base_url.trim_end_matches('/');
        origin_urls
            .iter()
            .map(|url| {
                let token = self.tokens.issue(url, scope, subject, content_id)?;
                Ok(format!("{base}/api/proxy/stream?token={token}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct FixedResolver(AccessDecision);

    #[async_trait]
    impl EntitlementResolver for FixedResolver {
        async fn resolve(
            &self,
            _subject: Option<&str>,
            _content_id: &str,
            _episode: u32,
        ) -> Result<AccessDecision> {
            Ok(self.0)
        }
    }

    fn create_service() -> PlaybackUrlService {
        let tokens = Arc::new(CapabilityTokenService::new(
            b"test-signing-secret",
            Duration::minutes(10),
        ));
        PlaybackUrlService::new(tokens, "http://proxy.example/")
    }

    fn origins() -> Vec<Url> {
        vec![
            Url::parse("http://origin-a.example/ep1/index.m3u8").unwrap(),
            Url::parse("http://origin-b.example/ep1/index.m3u8").unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_full_access_yields_full_scope_urls() {
        let service = create_service();
        let tokens = Arc::new(CapabilityTokenService::new(
            b"test-signing-secret",
            Duration::minutes(10),
        ));

        let urls = service
            .playback_urls(
                &FixedResolver(AccessDecision::Full),
                Some("user-1"),
                "ep-42",
                1,
                &origins(),
            )
            .await
            .unwrap();

        assert_eq!(urls.len(), 2);
        for (url, origin) in urls.iter().zip(origins()) {
            let token = url
                .strip_prefix("http://proxy.example/api/proxy/stream?token=")
                .expect("URL should carry a token");
            let claims = tokens.validate(token).unwrap();
            assert_eq!(claims.scope, AccessScope::Full);
            assert_eq!(claims.url, origin.to_string());
            assert_eq!(claims.sub.as_deref(), Some("user-1"));
        }
    }

    #[tokio::test]
    async fn test_preview_only_yields_preview_scope() {
        let service = create_service();
        let tokens = Arc::new(CapabilityTokenService::new(
            b"test-signing-secret",
            Duration::minutes(10),
        ));

        let urls = service
            .playback_urls(
                &FixedResolver(AccessDecision::PreviewOnly),
                None,
                "ep-42",
                3,
                &origins(),
            )
            .await
            .unwrap();

        let token = urls[0]
            .strip_prefix("http://proxy.example/api/proxy/stream?token=")
            .unwrap();
        assert_eq!(tokens.validate(token).unwrap().scope, AccessScope::Preview);
    }

    #[tokio::test]
    async fn test_denied_access_is_an_error() {
        let service = create_service();

        let result = service
            .playback_urls(
                &FixedResolver(AccessDecision::Denied),
                None,
                "ep-42",
                3,
                &origins(),
            )
            .await;

        assert!(matches!(result, Err(Error::AccessDenied(_))));
    }
}
