use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Durable key-value backend shared by every relay instance.
///
/// Each operation touches a single key; there are no multi-key transactions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite `key`. `ttl` is always non-zero here; `KeyValueStore` resolves defaults.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Read and delete `key`.
    ///
    /// Backends that can do this atomically should override the default.
    async fn take(&self, key: &str) -> Result<Option<String>> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.delete(key).await?;
        }
        Ok(value)
    }

    /// Remove expired entries for backends without native expiry.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}
