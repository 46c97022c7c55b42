use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::config::RepliesConfig;
use chatrelay_core::{BackendKind, UserId};
use chatrelay_store::KeyValueStore;
use tracing::{debug, info, instrument, warn};

use crate::registry::BackendRegistry;

/// Per-user backend assignment, stored as `botType:{user}`.
///
/// Assignments expire with the store's default TTL; a user with no (or an
/// unreadable) assignment talks to `default_backend`.
pub struct BackendSelector {
    store: Arc<KeyValueStore>,
    backends: Arc<BackendRegistry>,
    replies: RepliesConfig,
    default_backend: BackendKind,
}

impl BackendSelector {
    pub fn new(
        store: Arc<KeyValueStore>,
        backends: Arc<BackendRegistry>,
        replies: RepliesConfig,
        default_backend: BackendKind,
    ) -> Self {
        Self {
            store,
            backends,
            replies,
            default_backend,
        }
    }

    pub fn assignment_key(user: &UserId) -> String {
        format!("botType:{user}")
    }

    /// Assign `kind` to `user` and return the reply text.
    ///
    /// An unconfigured backend leaves the current assignment untouched and
    /// returns the configuration error instead of the welcome text.
    #[instrument(skip(self, user, kind), fields(user = %user, backend = %kind))]
    pub async fn switch_backend(&self, user: &UserId, kind: BackendKind) -> String {
        if let Err(msg) = self.backends.check(kind) {
            info!(reason = %msg, "switch refused");
            return msg;
        }
        self.store
            .set(&Self::assignment_key(user), kind.as_str(), Duration::ZERO)
            .await;
        info!("backend switched");
        self.replies.welcome_for(kind)
    }

    pub async fn resolve_backend(&self, user: &UserId) -> BackendKind {
        let Some(raw) = self.store.get(&Self::assignment_key(user)).await else {
            return self.default_backend;
        };
        match raw.parse::<BackendKind>() {
            Ok(kind) => {
                debug!(user = %user, backend = %kind, "backend resolved");
                kind
            }
            Err(e) => {
                warn!(user = %user, error = %e, "stored assignment is invalid, using default");
                self.default_backend
            }
        }
    }
}
