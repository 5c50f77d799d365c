//! Identity strategy table.
//!
//! Some origins reject requests from unrecognized clients. The fetch
//! engine works through this table in a fixed, deterministic order so
//! fallback behavior is reproducible across retries and testable: three
//! identity profiles, each tried with and without a referer.

use url::Url;

/// A client identity presented to an origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityProfile {
    pub user_agent: &'static str,
}

/// Referer choice for one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefererPolicy {
    /// Send the origin's own root (`scheme://host/`) as the referer.
    OriginRoot,
    /// Omit the referer header entirely.
    Omit,
}

/// One upstream attempt: an identity paired with a referer choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttempt {
    pub profile: IdentityProfile,
    pub referer: RefererPolicy,
}

/// Identity profiles tried against blocking origins, in order.
const PROFILES: [IdentityProfile; 3] = [
    IdentityProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    },
    IdentityProfile {
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) \
                     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 \
                     Mobile/15E148 Safari/604.1",
    },
    IdentityProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    },
];

/// Total attempts in the plan.
pub const ATTEMPT_COUNT: usize = PROFILES.len() * 2;

/// Identity used for requests that need no blocking workarounds (e.g. the
/// relay hop).
#[must_use]
pub fn default_profile() -> IdentityProfile {
    PROFILES[0]
}

/// The full attempt plan in its fixed order: each profile first with the
/// origin-root referer, then with none.
pub fn attempt_plan() -> impl Iterator<Item = FetchAttempt> {
    PROFILES.iter().flat_map(|profile| {
        [RefererPolicy::OriginRoot, RefererPolicy::Omit]
            .into_iter()
            .map(move |referer| FetchAttempt {
                profile: *profile,
                referer,
            })
    })
}

/// Referer value derived from an origin URL's root.
#[must_use]
pub fn referer_for(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_has_declared_size() {
        assert_eq!(attempt_plan().count(), ATTEMPT_COUNT);
        assert_eq!(ATTEMPT_COUNT, 6);
    }

    #[test]
    fn test_plan_order_is_deterministic() {
        let first: Vec<FetchAttempt> = attempt_plan().collect();
        let second: Vec<FetchAttempt> = attempt_plan().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_pairs_each_profile_with_both_referer_choices() {
        let plan: Vec<FetchAttempt> = attempt_plan().collect();

        for (i, chunk) in plan.chunks(2).enumerate() {
            assert_eq!(chunk[0].profile, PROFILES[i]);
            assert_eq!(chunk[0].referer, RefererPolicy::OriginRoot);
            assert_eq!(chunk[1].profile, PROFILES[i]);
            assert_eq!(chunk[1].referer, RefererPolicy::Omit);
        }
    }

    #[test]
    fn test_referer_is_the_origin_root() {
        let url = Url::parse("https://cdn.example.com/a/b/c.m3u8").unwrap();
        assert_eq!(referer_for(&url), "https://cdn.example.com/");

        let with_port = Url::parse("http://127.0.0.1:8443/x.ts").unwrap();
        assert_eq!(referer_for(&with_port), "http://127.0.0.1:8443/");
    }
}
