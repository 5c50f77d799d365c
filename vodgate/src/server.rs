use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use vodgate_api::{create_router, AppState};
use vodgate_core::Config;

/// HTTP server wiring for the delivery gateway.
pub struct VodgateServer {
    config: Config,
}

impl VodgateServer {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.config.http_address();

        match &self.config.upstream.relay_base {
            Some(relay) => info!("relay hop enabled via {relay}"),
            None => info!("no relay configured, upstream fetches are direct-only"),
        }
        info!(
            token_ttl_minutes = self.config.tokens.ttl_minutes,
            preview_max_seconds = self.config.playback.preview_max_seconds,
            "capability token policy loaded"
        );

        let state = AppState::new(Arc::new(self.config))?;
        let router = create_router(state);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("listening on {addr}");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        return;
    }
    info!("shutdown signal received");
}
