//! Per-domain upstream routing hints.
//!
//! Remembers, per origin domain, whether the relay hop was previously
//! required so the fetch engine can skip a doomed direct path. Purely an
//! optimization: a stale or wrong answer costs extra fallback attempts,
//! never correctness, because the fetch engine re-verifies over the wire.
//! Entries expire after a TTL and the whole cache fails open by clearing
//! itself when the entry cap is reached.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Routing hint for one origin domain.
#[derive(Debug, Clone)]
pub struct DomainPreference {
    pub needs_relay: bool,
    pub successes: u64,
    pub failures: u64,
    updated_at: Instant,
}

/// Concurrency-safe, TTL-bounded, capacity-capped preference map.
pub struct DomainPreferenceCache {
    entries: DashMap<String, DomainPreference>,
    ttl: Duration,
    max_entries: usize,
}

impl DomainPreferenceCache {
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Whether fetches for `domain` should try the relay hop first.
    ///
    /// Expired entries are treated as absent and removed on the spot to
    /// bound memory.
    pub fn should_prefer_relay(&self, domain: &str) -> bool {
        let expired = match self.entries.get(domain) {
            Some(entry) => {
                if entry.updated_at.elapsed() < self.ttl {
                    return entry.needs_relay;
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(domain);
        }
        false
    }

    /// Record that the relay hop worked for `domain`.
    pub fn record_relay_success(&self, domain: &str) {
        self.upsert(domain, |entry| {
            entry.needs_relay = true;
            entry.successes += 1;
        });
    }

    /// Record that a direct fetch worked for `domain`.
    pub fn record_direct_success(&self, domain: &str) {
        self.upsert(domain, |entry| {
            entry.needs_relay = false;
            entry.successes += 1;
        });
    }

    /// Record that the relay hop failed for `domain`.
    pub fn record_relay_failure(&self, domain: &str) {
        self.upsert(domain, |entry| {
            entry.failures += 1;
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn upsert(&self, domain: &str, update: impl FnOnce(&mut DomainPreference)) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(domain) {
            tracing::warn!(
                max_entries = self.max_entries,
                "domain preference cache full, clearing all entries"
            );
            self.entries.clear();
        }

        let mut entry = self
            .entries
            .entry(domain.to_string())
            .or_insert_with(|| DomainPreference {
                needs_relay: false,
                successes: 0,
                failures: 0,
                updated_at: Instant::now(),
            });
        update(&mut entry);
        entry.updated_at = Instant::now();
    }
}

impl std::fmt::Debug for DomainPreferenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainPreferenceCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
