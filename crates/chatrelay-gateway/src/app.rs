use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use chatrelay_agent::{BackendRegistry, ConversationOrchestrator, RelayContext};
use chatrelay_core::{RelayConfig, RelayError};
use chatrelay_store::KeyValueStore;

/// Resources the relay pipeline is built from.
pub struct RelayHost {
    pub config: RelayConfig,
    pub store: Arc<KeyValueStore>,
    pub backends: Arc<BackendRegistry>,
}

impl RelayContext for RelayHost {
    fn config(&self) -> &RelayConfig {
        &self.config
    }
    fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }
    fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }
}

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub host: RelayHost,
    pub relay: ConversationOrchestrator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        store: Arc<KeyValueStore>,
        backends: Arc<BackendRegistry>,
    ) -> Result<Self, RelayError> {
        let host = RelayHost {
            config,
            store,
            backends,
        };
        let relay = ConversationOrchestrator::from_context(&host)?;
        Ok(Self {
            host,
            relay,
            started_at: Instant::now(),
        })
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/webhooks/{source}",
            post(crate::http::webhooks::webhook_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
