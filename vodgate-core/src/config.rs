use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tokens: TokenConfig,
    pub playback: PlaybackConfig,
    pub upstream: UpstreamConfig,
    pub preference_cache: PreferenceCacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Externally reachable base URL, embedded into rewritten playlist
    /// references (e.g. `https://watch.example.com`).
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Capability token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Shared HMAC signing secret. Must be set for the server to start.
    pub secret: String,
    /// Token lifetime in minutes. Short by design: expiry is the only
    /// revocation mechanism, so the TTL bounds the blast radius of a
    /// leaked token.
    pub ttl_minutes: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Maximum cumulative segment duration served for preview-scope
    /// playback, in seconds.
    pub preview_max_seconds: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            preview_max_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Per-attempt deadline for playlist fetches, in seconds.
    pub manifest_timeout_seconds: u64,
    /// Per-attempt deadline for segment fetches, in seconds. Segments are
    /// larger and get a longer budget.
    pub segment_timeout_seconds: u64,
    /// Optional relay prefix for origins that block direct fetches. The
    /// origin URL is appended percent-encoded, so the value should end with
    /// its query key (e.g. `https://relay.example.com/fetch?url=`).
    pub relay_base: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            manifest_timeout_seconds: 20,
            segment_timeout_seconds: 30,
            relay_base: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceCacheConfig {
    /// Entries older than this are treated as absent.
    pub ttl_seconds: u64,
    /// Hard cap on tracked domains; the cache fails open by clearing
    /// itself when full.
    pub max_entries: usize,
}

impl Default for PreferenceCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_entries: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (VODGATE_SERVER_HOST, etc.)
        builder = builder.add_source(
            Environment::with_prefix("VODGATE")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Validate configuration, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.tokens.secret.is_empty() {
            errors.push("tokens.secret must be set".to_string());
        }
        if self.tokens.ttl_minutes <= 0 {
            errors.push("tokens.ttl_minutes must be positive".to_string());
        }
        if url::Url::parse(&self.server.public_base_url).is_err() {
            errors.push(format!(
                "server.public_base_url is not a valid URL: {}",
                self.server.public_base_url
            ));
        }
        if let Some(relay) = &self.upstream.relay_base {
            if url::Url::parse(relay).is_err() {
                errors.push(format!("upstream.relay_base is not a valid URL: {relay}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}
