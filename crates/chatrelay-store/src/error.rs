use thiserror::Error;

/// Errors raised by a remote store backend.
///
/// `KeyValueStore` logs these and degrades; they never reach the end user.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("store connection mutex poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
