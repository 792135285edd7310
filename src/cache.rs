//! In-memory TTL map backing the lockout, revocation and CSRF stores.
//!
//! Each operation touches a single key and is atomic for that key. Expired
//! entries are dropped lazily on read, and the whole map is swept every
//! [`SWEEP_INTERVAL`] writes so keys that are never read again do not pile up.
//!
//! The map lives in a single process. Running several instances behind a load
//! balancer needs a shared backing store with the same operations.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as Slot;

use crate::clock::Clock;

/// Number of writes between full sweeps of expired entries.
pub const SWEEP_INTERVAL: u64 = 256;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    /// Absolute expiry in Unix milliseconds.
    expires_at: u64,
}

impl<V> Entry<V> {
    fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    clock: Arc<dyn Clock>,
    writes: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            writes: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_with_expiry(key).map(|(value, _)| value)
    }

    /// Returns the live value together with its expiry in Unix milliseconds.
    pub fn get_with_expiry(&self, key: &K) -> Option<(V, u64)> {
        let now = self.clock.now_millis();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                return Some((entry.value.clone(), entry.expires_at));
            }
            Some(_) => {}
            None => return None,
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get_with_expiry(key).is_some()
    }

    /// Insert or replace a value with a fresh TTL.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.clock.now_millis() + ttl.as_millis() as u64;
        self.entries.insert(key, Entry { value, expires_at });
        self.note_write();
    }

    /// Update a value in place without touching its expiry.
    ///
    /// When no live entry exists, `f(None)` creates one with a fresh `ttl`.
    /// Returns the stored value and its expiry.
    pub fn upsert<F>(&self, key: K, ttl: Duration, f: F) -> (V, u64)
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let now = self.clock.now_millis();
        let fresh_expiry = now + ttl.as_millis() as u64;

        let stored = match self.entries.entry(key) {
            Slot::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let entry = occupied.get_mut();
                entry.value = f(Some(&entry.value));
                (entry.value.clone(), entry.expires_at)
            }
            Slot::Occupied(mut occupied) => {
                let value = f(None);
                occupied.insert(Entry {
                    value: value.clone(),
                    expires_at: fresh_expiry,
                });
                (value, fresh_expiry)
            }
            Slot::Vacant(vacant) => {
                let value = f(None);
                vacant.insert(Entry {
                    value: value.clone(),
                    expires_at: fresh_expiry,
                });
                (value, fresh_expiry)
            }
        };

        self.note_write();
        stored
    }

    /// Return the live value for `key`, creating it with `f` if absent.
    /// The boolean is `true` when a new value was created.
    pub fn get_or_insert_with<F>(&self, key: K, ttl: Duration, f: F) -> (V, bool)
    where
        F: FnOnce() -> V,
    {
        let now = self.clock.now_millis();
        let fresh_expiry = now + ttl.as_millis() as u64;

        let result = match self.entries.entry(key) {
            Slot::Occupied(occupied) if occupied.get().is_live(now) => {
                return (occupied.get().value.clone(), false);
            }
            Slot::Occupied(mut occupied) => {
                let value = f();
                occupied.insert(Entry {
                    value: value.clone(),
                    expires_at: fresh_expiry,
                });
                (value, true)
            }
            Slot::Vacant(vacant) => {
                let value = f();
                vacant.insert(Entry {
                    value: value.clone(),
                    expires_at: fresh_expiry,
                });
                (value, true)
            }
        };

        self.note_write();
        result
    }

    /// Remove an entry, returning its value if it was still live.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = self.clock.now_millis();
        self.entries
            .remove(key)
            .and_then(|(_, entry)| entry.is_live(now).then_some(entry.value))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn note_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_INTERVAL == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Swept expired cache entries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache() -> (TtlCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (TtlCache::new(clock.clone()), clock)
    }

    #[test]
    fn test_get_missing_key() {
        let (cache, _) = cache();
        assert_eq!(cache.get(&"nope".to_string()), None);
    }

    #[test]
    fn test_insert_and_get() {
        let (cache, _) = cache();
        cache.insert("a".into(), 1, Duration::from_secs(10));
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert!(cache.contains_key(&"a".to_string()));
    }

    #[test]
    fn test_entry_expires() {
        let (cache, clock) = cache();
        cache.insert("a".into(), 1, Duration::from_secs(10));

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get(&"a".to_string()), None);
        // Expired entry is dropped on read
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_upsert_keeps_original_expiry() {
        let (cache, clock) = cache();
        let key = "alice".to_string();

        let (first, expiry) = cache.upsert(key.clone(), Duration::from_secs(60), |v| {
            v.copied().unwrap_or(0) + 1
        });
        assert_eq!(first, 1);

        clock.advance(Duration::from_secs(30));
        let (second, second_expiry) = cache.upsert(key.clone(), Duration::from_secs(60), |v| {
            v.copied().unwrap_or(0) + 1
        });
        assert_eq!(second, 2);
        assert_eq!(second_expiry, expiry);

        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_upsert_after_expiry_starts_fresh() {
        let (cache, clock) = cache();
        let key = "alice".to_string();

        cache.upsert(key.clone(), Duration::from_secs(60), |v| {
            v.copied().unwrap_or(0) + 1
        });
        clock.advance(Duration::from_secs(61));

        let (value, expiry) = cache.upsert(key.clone(), Duration::from_secs(60), |v| {
            v.copied().unwrap_or(0) + 1
        });
        assert_eq!(value, 1);
        assert_eq!(expiry, clock.now_millis() + 60_000);
    }

    #[test]
    fn test_get_or_insert_with() {
        let (cache, clock) = cache();
        let key = "s".to_string();

        let (value, created) = cache.get_or_insert_with(key.clone(), Duration::from_secs(5), || 7);
        assert_eq!(value, 7);
        assert!(created);

        let (value, created) = cache.get_or_insert_with(key.clone(), Duration::from_secs(5), || 8);
        assert_eq!(value, 7);
        assert!(!created);

        clock.advance(Duration::from_secs(5));
        let (value, created) = cache.get_or_insert_with(key, Duration::from_secs(5), || 9);
        assert_eq!(value, 9);
        assert!(created);
    }

    #[test]
    fn test_remove() {
        let (cache, clock) = cache();
        cache.insert("a".into(), 1, Duration::from_secs(10));
        assert_eq!(cache.remove(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.insert("b".into(), 2, Duration::from_secs(10));
        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.remove(&"b".to_string()), None);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache();
        cache.insert("short".into(), 1, Duration::from_secs(1));
        cache.insert("long".into(), 2, Duration::from_secs(100));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"long".to_string()), Some(2));
    }

    #[test]
    fn test_writes_trigger_sweep() {
        let (cache, clock) = cache();
        for i in 0..10 {
            cache.insert(format!("old-{i}"), i, Duration::from_secs(1));
        }
        clock.advance(Duration::from_secs(2));

        for i in 0..(SWEEP_INTERVAL - 10) {
            cache.insert(format!("new-{i}"), 0, Duration::from_secs(100));
        }

        assert_eq!(cache.len(), (SWEEP_INTERVAL - 10) as usize);
    }
}
