//! Host context for the relay pipeline.

use std::sync::Arc;

use chatrelay_core::RelayConfig;
use chatrelay_store::KeyValueStore;

use crate::registry::BackendRegistry;

/// What the pipeline needs from its host.
///
/// Implemented by `AppState` in `chatrelay-gateway`. Lives here so the agent
/// crate does not depend on any inbound surface.
pub trait RelayContext: Send + Sync {
    fn config(&self) -> &RelayConfig;
    fn store(&self) -> &Arc<KeyValueStore>;
    fn backends(&self) -> &Arc<BackendRegistry>;
}
