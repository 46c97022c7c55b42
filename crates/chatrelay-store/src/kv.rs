use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cache::FastCache;
use crate::remote::RemoteStore;

/// Get/set/delete with expiry, fast path first.
///
/// Remote failures are logged and absorbed: a failed read is a miss, a failed
/// write leaves the value in the fast path only. Callers never see a store error.
///
/// Absent keys are not cached in the fast path, so a key written later by
/// another instance becomes visible on the next read.
pub struct KeyValueStore {
    cache: FastCache,
    remote: Option<Arc<dyn RemoteStore>>,
    default_ttl: Duration,
    mirror_ttl: Duration,
}

impl KeyValueStore {
    /// Store backed only by the in-process cache.
    pub fn in_memory(default_ttl: Duration) -> Self {
        Self {
            cache: FastCache::new(),
            remote: None,
            default_ttl,
            mirror_ttl: default_ttl,
        }
    }

    /// Store with a durable remote behind the fast path.
    ///
    /// `mirror_ttl` bounds how long a value read from the remote is served
    /// from the fast path without asking the remote again.
    pub fn with_remote(
        remote: Arc<dyn RemoteStore>,
        default_ttl: Duration,
        mirror_ttl: Duration,
    ) -> Self {
        Self {
            cache: FastCache::new(),
            remote: Some(remote),
            default_ttl,
            mirror_ttl,
        }
    }

    pub fn is_durable(&self) -> bool {
        self.remote.is_some()
    }

    /// Zero means "use the default TTL", never "no expiry".
    fn resolve_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() {
            self.default_ttl
        } else {
            ttl
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.cache.get(key) {
            debug!("fast path hit");
            return Some(value);
        }

        let remote = self.remote.as_ref()?;
        match remote.get(key).await {
            Ok(Some(value)) => {
                let ttl = self.mirror_ttl.min(self.default_ttl);
                self.cache.set(key, value.clone(), ttl);
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(store = remote.name(), error = %e, "remote get failed, treating as miss");
                None
            }
        }
    }

    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let ttl = self.resolve_ttl(ttl);
        self.cache.set(key, value, ttl);

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.set(key, value, ttl).await {
                warn!(store = remote.name(), error = %e, "remote set failed, value kept in-process only");
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) {
        self.cache.remove(key);

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(key).await {
                warn!(store = remote.name(), error = %e, "remote delete failed");
            }
        }
    }

    /// Read and delete `key` in one step.
    ///
    /// With a remote configured the remote answer wins, so a value consumed by
    /// another instance is not served again from a stale fast-path copy. The
    /// local copy is only used when the remote cannot be reached.
    #[instrument(skip(self))]
    pub async fn take(&self, key: &str) -> Option<String> {
        let local = self.cache.remove(key);

        let Some(remote) = &self.remote else {
            return local;
        };
        match remote.take(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(store = remote.name(), error = %e, "remote take failed, using in-process copy");
                local
            }
        }
    }

    /// Drop expired fast-path entries and, for backends without native
    /// expiry, expired remote rows.
    pub async fn purge_expired(&self) -> usize {
        let mut removed = self.cache.purge_expired();
        if let Some(remote) = &self.remote {
            match remote.purge_expired().await {
                Ok(n) => removed += n,
                Err(e) => warn!(store = remote.name(), error = %e, "remote purge failed"),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, StoreError};
    use crate::sqlite_store::SqliteStore;
    use async_trait::async_trait;

    /// Remote that is always unreachable.
    struct DownStore;

    #[async_trait]
    impl RemoteStore for DownStore {
        fn name(&self) -> &str {
            "down"
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(StoreError::Poisoned)
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(StoreError::Poisoned)
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(StoreError::Poisoned)
        }
    }

    fn sqlite() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap())
    }

    #[tokio::test]
    async fn in_memory_roundtrip() {
        let kv = KeyValueStore::in_memory(Duration::from_secs(60));
        assert!(!kv.is_durable());
        kv.set("k", "v", Duration::ZERO).await;
        assert_eq!(kv.get("k").await.as_deref(), Some("v"));
        kv.delete("k").await;
        assert_eq!(kv.get("k").await, None);
    }

    #[tokio::test]
    async fn set_writes_through_to_remote() {
        let remote = sqlite();
        let kv = KeyValueStore::with_remote(remote.clone(), Duration::from_secs(60), Duration::from_secs(5));
        kv.set("k", "v", Duration::ZERO).await;
        assert_eq!(remote.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn miss_falls_through_and_populates_fast_path() {
        let remote = sqlite();
        remote.set("k", "from-remote", Duration::from_secs(60)).await.unwrap();
        let kv = KeyValueStore::with_remote(remote.clone(), Duration::from_secs(60), Duration::from_secs(60));

        assert_eq!(kv.get("k").await.as_deref(), Some("from-remote"));
        // Removing it remotely does not affect the mirrored copy.
        remote.delete("k").await.unwrap();
        assert_eq!(kv.get("k").await.as_deref(), Some("from-remote"));
    }

    #[tokio::test]
    async fn absent_keys_are_not_cached() {
        let remote = sqlite();
        let kv = KeyValueStore::with_remote(remote.clone(), Duration::from_secs(60), Duration::from_secs(60));

        assert_eq!(kv.get("late").await, None);
        remote.set("late", "now-here", Duration::from_secs(60)).await.unwrap();
        assert_eq!(kv.get("late").await.as_deref(), Some("now-here"));
    }

    #[tokio::test]
    async fn take_prefers_remote_answer() {
        let remote = sqlite();
        let kv = KeyValueStore::with_remote(remote.clone(), Duration::from_secs(60), Duration::from_secs(60));
        kv.set("p", "reply", Duration::ZERO).await;

        // Another instance consumed it first.
        remote.take("p").await.unwrap();
        assert_eq!(kv.take("p").await, None);
    }

    #[tokio::test]
    async fn unreachable_remote_degrades_to_fast_path() {
        let kv = KeyValueStore::with_remote(Arc::new(DownStore), Duration::from_secs(60), Duration::from_secs(60));
        kv.set("k", "v", Duration::ZERO).await;
        assert_eq!(kv.get("k").await.as_deref(), Some("v"));
        assert_eq!(kv.take("k").await.as_deref(), Some("v"));
        assert_eq!(kv.get("k").await, None);
    }
}
