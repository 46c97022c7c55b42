use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Longest expiry the cache accepts; larger TTLs are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process key-value cache with per-entry expiry.
///
/// Expired entries are dropped lazily on access and in bulk by
/// `purge_expired`, which the gateway calls on a timer.
#[derive(Default)]
pub struct FastCache {
    map: DashMap<String, Entry>,
}

impl FastCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entry = self.map.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.map.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let entry = Entry {
            value: value.into(),
            expires_at: Instant::now() + ttl.min(MAX_TTL),
        };
        self.map.insert(key.into(), entry);
    }

    /// Remove `key`, returning its value if it had not expired yet.
    ///
    /// Removal is atomic, so of two concurrent callers at most one gets the value.
    pub fn remove(&self, key: &str) -> Option<String> {
        let (_, entry) = self.map.remove(key)?;
        (!entry.is_expired(Instant::now())).then_some(entry.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.map.len())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let cache = FastCache::new();
        cache.set("k", "v", Duration::from_secs(60));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expired_entry_is_invisible_and_evicted() {
        let cache = FastCache::new();
        cache.set("k", "v", Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_consumes_once() {
        let cache = FastCache::new();
        cache.set("k", "v", Duration::from_secs(60));
        assert_eq!(cache.remove("k").as_deref(), Some("v"));
        assert_eq!(cache.remove("k"), None);
    }

    #[test]
    fn purge_only_drops_expired() {
        let cache = FastCache::new();
        cache.set("old", "1", Duration::ZERO);
        cache.set("new", "2", Duration::from_secs(60));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new").as_deref(), Some("2"));
    }

    #[test]
    fn huge_ttl_is_clamped_instead_of_overflowing() {
        let cache = FastCache::new();
        cache.set("k", "v", Duration::MAX);
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }
}
