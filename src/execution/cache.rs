//! Memoization of operator results.
//!
//! Results are keyed by (operator instance, data source, region). Each key owns
//! a slot with its own lock, so concurrent first requests for the same key run
//! the computation once while requests for other keys proceed in parallel.

use crate::core::block::Block;
use crate::core::config::CacheConfig;
use crate::core::error::EngineResult;
use crate::core::geometry::Region;
use crate::core::source::SourceId;
use crate::execution::operator::OperatorId;
use log::trace;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cache key identifying one operator application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The operator instance.
    pub operator: OperatorId,
    /// The dataset it was applied to.
    pub source: SourceId,
    /// The requested region.
    pub region: Region,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(operator: OperatorId, source: SourceId, region: Region) -> Self {
        Self {
            operator,
            source,
            region,
        }
    }
}

/// Cached entry with metadata.
#[derive(Debug, Clone)]
struct CacheEntry {
    block: Block,
    computation_time: Duration,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (computations started).
    pub misses: u64,
    /// Number of entries evicted.
    pub evictions: u64,
    /// Total time saved by cache hits.
    pub time_saved: Duration,
}

impl CacheStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Thread-safe, capacity-bounded LRU cache of operator results.
pub struct OperatorCache {
    /// Per-key slots in LRU order.
    slots: Mutex<LruCache<CacheKey, Slot>>,
    /// Cache statistics.
    stats: Mutex<CacheStats>,
}

impl OperatorCache {
    /// Create a new cache holding at most `capacity` blocks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// A cache sized by the `[cache]` section.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Return the block for `key`, running `compute` only if no other caller
    /// has produced it yet. Failed computations are not cached.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> EngineResult<Block>
    where
        F: FnOnce() -> EngineResult<Block>,
    {
        let slot = self.slot_for(key);

        // Holding the slot lock while computing makes concurrent first
        // requests for the same key wait for this result.
        let mut entry = slot.lock();
        if let Some(entry) = entry.as_ref() {
            let mut stats = self.stats.lock();
            stats.hits += 1;
            stats.time_saved += entry.computation_time;
            return Ok(entry.block.clone());
        }

        self.stats.lock().misses += 1;
        let started = Instant::now();
        let block = compute()?;
        trace!("Cached result of {} for {}", key.operator, key.region);
        *entry = Some(CacheEntry {
            block: block.clone(),
            computation_time: started.elapsed(),
        });
        Ok(block)
    }

    fn slot_for(&self, key: CacheKey) -> Slot {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(&key) {
            return Arc::clone(slot);
        }
        let slot: Slot = Arc::new(Mutex::new(None));
        if slots.push(key, Arc::clone(&slot)).is_some() {
            self.stats.lock().evictions += 1;
        }
        slot
    }

    /// Check if a finished result is stored for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let slot = self.slots.lock().peek(key).cloned();
        slot.map(|slot| slot.lock().is_some()).unwrap_or(false)
    }

    /// Invalidate a specific entry.
    pub fn invalidate(&self, key: &CacheKey) {
        self.slots.lock().pop(key);
    }

    /// Invalidate all entries of one operator.
    pub fn invalidate_operator(&self, operator: OperatorId) {
        let mut slots = self.slots.lock();
        let keys_to_remove: Vec<_> = slots
            .iter()
            .filter(|(k, _)| k.operator == operator)
            .map(|(k, _)| *k)
            .collect();

        for key in keys_to_remove {
            slots.pop(&key);
        }
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.slots.lock().cap().get()
    }

    /// Get number of cached entries.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OperatorCache {
    fn default() -> Self {
        Self::new(crate::core::config::DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for OperatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A shared cache wrapped in Arc.
pub type SharedCache = Arc<OperatorCache>;

/// Create a new shared cache.
pub fn new_shared_cache(capacity: usize) -> SharedCache {
    Arc::new(OperatorCache::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineError;
    use crate::core::geometry::{Point5, Shape5};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn region(offset: i64) -> Region {
        Region::at(Point5::new(0, 0, offset, 0, 0), Shape5::spatial(1, 4, 4)).unwrap()
    }

    fn key(operator: OperatorId, source: SourceId, offset: i64) -> CacheKey {
        CacheKey::new(operator, source, region(offset))
    }

    #[test]
    fn test_second_request_is_a_hit() {
        let cache = OperatorCache::new(4);
        let k = key(OperatorId::new(), SourceId::new(), 0);
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Block::filled(region(0), 1.0))
        };

        let first = cache.get_or_compute(k, compute).unwrap();
        let second = cache.get_or_compute(k, compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.bit_identical(&second));
        assert!(cache.contains(&k));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[test]
    fn test_keys_distinguish_operator_and_source() {
        let cache = OperatorCache::new(8);
        let (op_a, op_b) = (OperatorId::new(), OperatorId::new());
        let source = SourceId::new();
        cache.get_or_compute(key(op_a, source, 0), || Ok(Block::filled(region(0), 1.0))).unwrap();
        let other = cache
            .get_or_compute(key(op_b, source, 0), || Ok(Block::filled(region(0), 2.0)))
            .unwrap();
        assert_eq!(other.data()[0], 2.0);
        assert_eq!(cache.len(), 2);

        cache.invalidate_operator(op_a);
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(&key(op_a, source, 0)));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = OperatorCache::new(2);
        let (op, source) = (OperatorId::new(), SourceId::new());
        for offset in 0..3 {
            cache
                .get_or_compute(key(op, source, offset), || Ok(Block::filled(region(offset), 0.0)))
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        assert!(!cache.contains(&key(op, source, 0)));
        assert!(cache.contains(&key(op, source, 2)));
    }

    #[test]
    fn test_capacity_from_config() {
        let config = crate::core::config::EngineConfig::from_toml_str("[cache]\ncapacity = 3\n").unwrap();
        let cache = OperatorCache::from_config(&config.cache);
        assert_eq!(cache.capacity(), 3);
        assert_eq!(
            OperatorCache::from_config(&CacheConfig::default()).capacity(),
            crate::core::config::DEFAULT_CACHE_CAPACITY
        );
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = OperatorCache::new(2);
        let k = key(OperatorId::new(), SourceId::new(), 0);
        let failed = cache.get_or_compute(k, || Err(EngineError::InvalidInput("boom".into())));
        assert!(failed.is_err());
        assert!(!cache.contains(&k));
        let retried = cache.get_or_compute(k, || Ok(Block::filled(region(0), 3.0))).unwrap();
        assert_eq!(retried.data()[0], 3.0);
    }

    #[test]
    fn test_concurrent_first_access_computes_once() {
        let cache = Arc::new(OperatorCache::new(4));
        let k = key(OperatorId::new(), SourceId::new(), 0);
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_compute(k, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            Ok(Block::filled(region(0), 7.0))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().data()[0], 7.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 7);
    }
}
