//! String-keyed persistence with expiry.
//!
//! `KeyValueStore` layers an in-process `FastCache` in front of an optional
//! `RemoteStore` (Redis or SQLite). The fast path never owns the truth: it can
//! be dropped at any time at the cost of extra remote round-trips.

pub mod cache;
pub mod error;
pub mod kv;
pub mod redis_store;
pub mod remote;
pub mod sqlite_store;

pub use cache::FastCache;
pub use error::StoreError;
pub use kv::KeyValueStore;
pub use remote::RemoteStore;
pub use redis_store::RedisStore;
pub use sqlite_store::SqliteStore;
