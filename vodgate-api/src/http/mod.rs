// Module: http
// HTTP surface of the delivery proxy.

pub mod error;
pub mod health;
pub mod proxy;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use vodgate_core::cache::DomainPreferenceCache;
use vodgate_core::service::CapabilityTokenService;
use vodgate_core::{Config, Result};
use vodgate_proxy::{FetchConfig, FetchEngine};

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<CapabilityTokenService>,
    pub fetch_engine: Arc<FetchEngine>,
}

impl AppState {
    /// Build the shared services from configuration.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let tokens = Arc::new(CapabilityTokenService::new(
            config.tokens.secret.as_bytes(),
            chrono::Duration::minutes(config.tokens.ttl_minutes),
        ));

        let preferences = Arc::new(DomainPreferenceCache::new(
            Duration::from_secs(config.preference_cache.ttl_seconds),
            config.preference_cache.max_entries,
        ));

        let fetch_engine = Arc::new(FetchEngine::new(
            preferences,
            FetchConfig {
                manifest_timeout: Duration::from_secs(config.upstream.manifest_timeout_seconds),
                segment_timeout: Duration::from_secs(config.upstream.segment_timeout_seconds),
                relay_base: config.upstream.relay_base.clone(),
            },
        )?);

        Ok(Self {
            config,
            tokens,
            fetch_engine,
        })
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/proxy/stream",
            get(proxy::proxy_stream).options(proxy::preflight),
        )
        .route(
            "/api/proxy/video",
            get(proxy::proxy_video).options(proxy::preflight),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
