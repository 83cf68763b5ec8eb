//! In-memory TTL cache used to memoize grant lookups and other expensive
//! reads. Entries expire lazily: a read past the deadline evicts the entry
//! and reports a miss, so no background sweeper is required.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe key-value cache with per-entry TTL.
///
/// Owned by the application state rather than a process global so tests can
/// construct and drop their own instances. For multi-instance deployments
/// the same interface can front an external shared cache.
pub struct TtlCache<V> {
    inner: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value, or None if absent or expired. An expired
    /// entry is evicted as a side effect of the read.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut map = self.inner.lock().expect("cache lock poisoned");
        let expired = match map.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(Instant::now()),
        };

        if expired {
            map.remove(key);
            return None;
        }

        map.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut map = self.inner.lock().expect("cache lock poisoned");
        map.insert(key.into(), entry);
    }

    pub fn delete(&self, key: &str) {
        let mut map = self.inner.lock().expect("cache lock poisoned");
        map.remove(key);
    }

    pub fn clear(&self) {
        let mut map = self.inner.lock().expect("cache lock poisoned");
        map.clear();
    }

    /// Drop every expired entry. Callers may run this opportunistically;
    /// correctness never depends on it.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut map = self.inner.lock().expect("cache lock poisoned");
        map.retain(|_, entry| !entry.is_expired(now));
    }

    pub fn size(&self) -> usize {
        let map = self.inner.lock().expect("cache lock poisoned");
        map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn set_then_get_returns_value() {
        let cache: TtlCache<String> = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn expired_entry_is_absent_and_evicted() {
        let cache: TtlCache<String> = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_millis(50));
        assert_eq!(cache.get("k"), Some("v".to_string()));

        sleep(Duration::from_millis(80));
        assert_eq!(cache.get("k"), None);
        // the read itself evicted the entry
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn delete_removes_entry() {
        let cache: TtlCache<i64> = TtlCache::new();
        cache.set("gone", 1, Duration::from_secs(60));
        cache.delete("gone");
        assert_eq!(cache.get("gone"), None);
    }

    #[test]
    fn clear_removes_everything() {
        let cache: TtlCache<i64> = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("b", 2, Duration::from_secs(60));
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn cleanup_drops_only_expired_entries() {
        let cache: TtlCache<i64> = TtlCache::new();
        cache.set("short", 1, Duration::from_millis(30));
        cache.set("long", 2, Duration::from_secs(60));

        sleep(Duration::from_millis(60));
        cache.cleanup_expired();

        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }
}
