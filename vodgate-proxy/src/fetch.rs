//! Origin fetch engine.
//!
//! Attempts an upstream GET under each identity in the strategy table,
//! sequentially and with a per-attempt deadline, stopping at the first
//! 200/206. Attempts are never issued in parallel: a struggling or
//! blocking origin should not be hammered with concurrent requests from a
//! single client request, and sequential order keeps fallback behavior
//! deterministic.
//!
//! When a relay prefix is configured, a domain whose direct path is known
//! bad (per the domain preference cache) is fetched through the relay
//! first; otherwise the relay is the final fallback after the direct
//! attempts.

use std::sync::Arc;
use std::time::Duration;

use percent_encoding::utf8_percent_encode;
use reqwest::header::{RANGE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use url::Url;

use vodgate_core::cache::DomainPreferenceCache;
use vodgate_core::{Error, Result};

use crate::identity::{attempt_plan, default_profile, referer_for, RefererPolicy};
use crate::rewrite::QUERY_VALUE;

/// Which deadline budget a fetch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Manifest,
    Segment,
}

/// Fetch engine settings, derived from `upstream` configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub manifest_timeout: Duration,
    pub segment_timeout: Duration,
    /// Relay prefix ending in its query key (e.g. `https://relay/fetch?url=`).
    pub relay_base: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            manifest_timeout: Duration::from_secs(20),
            segment_timeout: Duration::from_secs(30),
            relay_base: None,
        }
    }
}

/// A successful upstream response.
#[derive(Debug)]
pub struct FetchOutcome {
    /// URL relative playlist references resolve against. For direct
    /// fetches this is the final URL after redirects; for relay fetches it
    /// is the origin URL itself.
    pub effective_url: Url,
    pub via_relay: bool,
    pub response: reqwest::Response,
}

enum Route {
    Direct,
    Relay,
}

/// Fetches origin URLs with identity fallback and relay routing.
pub struct FetchEngine {
    client: Client,
    preferences: Arc<DomainPreferenceCache>,
    config: FetchConfig,
}

impl FetchEngine {
    pub fn new(preferences: Arc<DomainPreferenceCache>, config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build upstream HTTP client: {e}")))?;

        Ok(Self {
            client,
            preferences,
            config,
        })
    }

    /// Fetch `url`, forwarding `range` verbatim when present.
    ///
    /// Returns the first 200/206 response, or `UpstreamExhausted` carrying
    /// the last failure once every attempt has been consumed.
    pub async fn fetch(
        &self,
        url: &Url,
        range: Option<&str>,
        kind: FetchKind,
    ) -> Result<FetchOutcome> {
        let timeout = match kind {
            FetchKind::Manifest => self.config.manifest_timeout,
            FetchKind::Segment => self.config.segment_timeout,
        };
        let domain = url.host_str().unwrap_or_default().to_string();

        let relay_url = match self.config.relay_base.as_deref() {
            Some(base) => Some(build_relay_url(base, url)?),
            None => None,
        };

        let mut routes = Vec::with_capacity(2);
        if relay_url.is_some() && self.preferences.should_prefer_relay(&domain) {
            routes.push(Route::Relay);
            routes.push(Route::Direct);
        } else {
            routes.push(Route::Direct);
            if relay_url.is_some() {
                routes.push(Route::Relay);
            }
        }

        let mut attempts = 0usize;
        let mut last_failure = String::from("no attempts made");

        for route in routes {
            match route {
                Route::Direct => {
                    for attempt in attempt_plan() {
                        attempts += 1;
                        let referer = match attempt.referer {
                            RefererPolicy::OriginRoot => Some(referer_for(url)),
                            RefererPolicy::Omit => None,
                        };
                        match self
                            .send_attempt(url, attempt.profile.user_agent, referer, range, timeout)
                            .await
                        {
                            Ok(response) => {
                                if relay_url.is_some() {
                                    self.preferences.record_direct_success(&domain);
                                }
                                tracing::debug!(
                                    url = %url,
                                    attempts,
                                    "direct upstream fetch succeeded"
                                );
                                return Ok(FetchOutcome {
                                    effective_url: response.url().clone(),
                                    via_relay: false,
                                    response,
                                });
                            }
                            Err(failure) => {
                                tracing::debug!(
                                    url = %url,
                                    attempt = attempts,
                                    failure = %failure,
                                    "upstream attempt failed"
                                );
                                last_failure = failure;
                            }
                        }
                    }
                }
                Route::Relay => {
                    let Some(relay_target) = relay_url.clone() else {
                        continue;
                    };
                    attempts += 1;
                    // The relay is trusted infrastructure; one attempt
                    // under the default identity is enough.
                    match self
                        .send_attempt(
                            &relay_target,
                            default_profile().user_agent,
                            None,
                            range,
                            timeout,
                        )
                        .await
                    {
                        Ok(response) => {
                            self.preferences.record_relay_success(&domain);
                            tracing::debug!(url = %url, attempts, "relay upstream fetch succeeded");
                            // The relay hands back the origin body; relative
                            // references still resolve against the origin URL.
                            return Ok(FetchOutcome {
                                effective_url: url.clone(),
                                via_relay: true,
                                response,
                            });
                        }
                        Err(failure) => {
                            self.preferences.record_relay_failure(&domain);
                            last_failure = failure;
                        }
                    }
                }
            }
        }

        tracing::warn!(
            url = %url,
            attempts,
            last_failure = %last_failure,
            "all upstream attempts exhausted"
        );
        Err(Error::UpstreamExhausted {
            attempts,
            last: last_failure,
        })
    }

    async fn send_attempt(
        &self,
        target: &Url,
        user_agent: &str,
        referer: Option<String>,
        range: Option<&str>,
        timeout: Duration,
    ) -> std::result::Result<reqwest::Response, String> {
        let mut request = self
            .client
            .get(target.clone())
            .timeout(timeout)
            .header(USER_AGENT, user_agent);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }

        match request.send().await {
            Ok(response)
                if response.status() == StatusCode::OK
                    || response.status() == StatusCode::PARTIAL_CONTENT =>
            {
                Ok(response)
            }
            Ok(response) => Err(format!(
                "{} answered {}",
                target.host_str().unwrap_or("origin"),
                response.status()
            )),
            Err(e) if e.is_timeout() => Err(format!("attempt timed out after {timeout:?}")),
            Err(e) => Err(e.to_string()),
        }
    }
}

fn build_relay_url(relay_base: &str, origin: &Url) -> Result<Url> {
    let encoded = utf8_percent_encode(origin.as_str(), QUERY_VALUE);
    Url::parse(&format!("{relay_base}{encoded}"))
        .map_err(|e| Error::Internal(format!("Relay URL does not parse: {e}")))
}
