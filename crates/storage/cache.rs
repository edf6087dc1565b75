//! Bounded in-memory caches: LRU, sharded LRU and FIFO.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Replacement policy of one namespace cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    Lru,
    /// LRU split over several locks to lower contention on hot caches.
    ShardedLru,
    Fifo,
}

/// A bounded, internally synchronized cache.
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    fn add(&self, key: K, value: V);

    /// Drops every entry.
    fn purge(&self);
}

/// Builds a cache with the given policy and capacity.
pub fn new_cache<K, V>(policy: CachePolicy, capacity: usize) -> Box<dyn Cache<K, V>>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    match policy {
        CachePolicy::Lru => Box::new(LruMemCache::new(capacity)),
        CachePolicy::ShardedLru => Box::new(ShardedLruCache::new(capacity, LRU_SHARD_COUNT)),
        CachePolicy::Fifo => Box::new(FifoCache::new(capacity)),
    }
}

/// Lock shards of a sharded LRU cache. Power of two.
const LRU_SHARD_COUNT: usize = 16;

struct LruMemCache<K: Hash + Eq, V> {
    inner: Mutex<lru::LruCache<K, V>>,
}

impl<K: Hash + Eq, V> LruMemCache<K, V> {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(lru::LruCache::new(capacity)),
        }
    }
}

impl<K, V> Cache<K, V> for LruMemCache<K, V>
where
    K: Hash + Eq + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;
        inner.get(key).cloned()
    }

    fn add(&self, key: K, value: V) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.put(key, value);
        }
    }

    fn purge(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.clear();
        }
    }
}

struct ShardedLruCache<K: Hash + Eq, V> {
    shards: Vec<Mutex<lru::LruCache<K, V>>>,
}

impl<K: Hash + Eq, V> ShardedLruCache<K, V> {
    fn new(capacity: usize, shard_count: usize) -> Self {
        let per_shard = (capacity / shard_count).max(1);
        let per_shard = NonZeroUsize::new(per_shard).unwrap_or(NonZeroUsize::MIN);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(lru::LruCache::new(per_shard)))
            .collect();
        Self { shards }
    }

    fn shard_for(&self, key: &K) -> &Mutex<lru::LruCache<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = hasher.finish() as usize & (self.shards.len() - 1);
        &self.shards[index]
    }
}

impl<K, V> Cache<K, V> for ShardedLruCache<K, V>
where
    K: Hash + Eq + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut shard = self.shard_for(key).lock().ok()?;
        shard.get(key).cloned()
    }

    fn add(&self, key: K, value: V) {
        if let Ok(mut shard) = self.shard_for(&key).lock() {
            shard.put(key, value);
        }
    }

    fn purge(&self) {
        for shard in &self.shards {
            if let Ok(mut shard) = shard.lock() {
                shard.clear();
            }
        }
    }
}

struct FifoInner<K, V> {
    map: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

struct FifoCache<K, V> {
    inner: Mutex<FifoInner<K, V>>,
}

impl<K: Hash + Eq + Clone, V> FifoCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(FifoInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            }),
        }
    }
}

impl<K, V> Cache<K, V> for FifoCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock().ok()?;
        inner.map.get(key).cloned()
    }

    fn add(&self, key: K, value: V) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.map.insert(key.clone(), value).is_none() {
            inner.order.push_back(key);
            while inner.map.len() > inner.capacity {
                let Some(evicted) = inner.order.pop_front() else {
                    break;
                };
                inner.map.remove(&evicted);
            }
        }
    }

    fn purge(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.clear();
            inner.order.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache: Box<dyn Cache<u32, u32>> = new_cache(CachePolicy::Lru, 2);
        cache.add(1, 10);
        cache.add(2, 20);
        assert_eq!(cache.get(&1), Some(10)); // refresh 1
        cache.add(3, 30); // evicts 2
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&3), Some(30));
    }

    #[test]
    fn fifo_evicts_in_insertion_order() {
        let cache: Box<dyn Cache<u32, u32>> = new_cache(CachePolicy::Fifo, 2);
        cache.add(1, 10);
        cache.add(2, 20);
        assert_eq!(cache.get(&1), Some(10)); // does not refresh
        cache.add(3, 30); // evicts 1
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
    }

    #[test]
    fn fifo_overwrite_keeps_position() {
        let cache: Box<dyn Cache<u32, u32>> = new_cache(CachePolicy::Fifo, 2);
        cache.add(1, 10);
        cache.add(1, 11);
        cache.add(2, 20);
        assert_eq!(cache.get(&1), Some(11));
        assert_eq!(cache.get(&2), Some(20));
    }

    #[test]
    fn sharded_lru_stores_and_purges() {
        let cache: Box<dyn Cache<u64, u64>> = new_cache(CachePolicy::ShardedLru, 1024);
        for i in 0..100u64 {
            cache.add(i, i * 2);
        }
        for i in 0..100u64 {
            assert_eq!(cache.get(&i), Some(i * 2));
        }
        cache.purge();
        assert_eq!(cache.get(&5), None);
    }
}
