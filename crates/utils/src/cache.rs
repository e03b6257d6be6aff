//! Bounded, weighted caches built on `quick_cache`. `Cache` is plain LRU by
//! byte weight; `CacheWithTtl` additionally expires entries after a fixed
//! lifetime, for results (DNSBL answers, resolver replies) that must not be
//! trusted forever.

use std::hash::Hash;
use std::time::{Duration, Instant};

use quick_cache::sync::Cache as QuickCache;
use quick_cache::Weighter;

use crate::config::Config;

#[derive(Clone)]
struct UnitWeighter;

impl<K, V> Weighter<K, V> for UnitWeighter {
    fn weight(&self, _key: &K, _val: &V) -> u64 {
        1
    }
}

pub struct Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: QuickCache<K, V, UnitWeighter>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity_items: u64) -> Self {
        Cache {
            inner: QuickCache::with_weighter(capacity_items as usize, capacity_items, UnitWeighter),
        }
    }

    /// Sizes a cache from config the way the teacher's `Data::parse` does:
    /// a byte budget divided by a per-entry size estimate.
    pub fn from_config(config: &mut Config, name: &str, byte_budget: u64, item_size: u64) -> Self {
        let capacity = config
            .property::<u64>(&format!("cache.{name}.capacity"))
            .unwrap_or_else(|| (byte_budget / item_size.max(1)).max(1));
        Self::new(capacity)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    pub fn remove(&self, key: &K) {
        self.inner.remove(key);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(128)
    }
}

struct Expiring<V> {
    value: V,
    valid_until: Option<Instant>,
}

pub struct CacheWithTtl<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: QuickCache<K, Expiring<V>, UnitWeighter>,
}

impl<K, V> CacheWithTtl<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity_items: u64) -> Self {
        CacheWithTtl {
            inner: QuickCache::with_weighter(capacity_items as usize, capacity_items, UnitWeighter),
        }
    }

    pub fn from_config(config: &mut Config, name: &str, byte_budget: u64, item_size: u64) -> Self {
        let capacity = config
            .property::<u64>(&format!("cache.{name}.capacity"))
            .unwrap_or_else(|| (byte_budget / item_size.max(1)).max(1));
        Self::new(capacity)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.inner.get(key)?;
        if entry.valid_until.is_some_and(|t| Instant::now() > t) {
            self.inner.remove(key);
            return None;
        }
        Some(entry.value)
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(
            key,
            Expiring {
                value,
                valid_until: None,
            },
        );
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.inner.insert(
            key,
            Expiring {
                value,
                valid_until: Some(Instant::now() + ttl),
            },
        );
    }

    pub fn insert_with_expiry(&self, key: K, value: V, valid_until: Instant) {
        self.inner.insert(
            key,
            Expiring {
                value,
                valid_until: Some(valid_until),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ttl_cache_expires_entries() {
        let cache = CacheWithTtl::new(8);
        cache.insert_with_ttl("a", 1, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn ttl_cache_keeps_entries_without_expiry() {
        let cache: CacheWithTtl<&str, i32> = CacheWithTtl::new(8);
        cache.insert("a", 42);
        assert_eq!(cache.get(&"a"), Some(42));
    }
}
