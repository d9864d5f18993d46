//! Bounded FIFO cache of recently decoded records.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::error::Result;

/// Default number of cached entries.
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug)]
struct CacheEntry<T> {
    index: i32,
    value: Arc<T>,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Keeps the last `capacity` loaded values keyed by index.
///
/// Eviction is strict insertion order: a hit does not move an entry.
/// Loaders returning `Ok(None)` are not cached.
#[derive(Debug)]
pub struct RecencyCache<T> {
    entries: VecDeque<CacheEntry<T>>,
    capacity: usize,
    copy_on_hit: bool,
    stats: CacheStats,
}

impl<T: Clone> RecencyCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            copy_on_hit: false,
            stats: CacheStats::default(),
        }
    }

    /// Capacity and copy-on-hit from `config`.
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.cache_capacity).with_copy_on_hit(config.copy_on_hit)
    }

    /// Hand out a fresh copy on every hit instead of the shared value.
    pub fn with_copy_on_hit(mut self, copy: bool) -> Self {
        self.copy_on_hit = copy;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cached_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, index: i32) -> bool {
        self.entries.iter().any(|e| e.index == index)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached value for `index`, or the loader's result on a miss.
    pub fn get_or_load<F>(&mut self, index: i32, loader: F) -> Result<Option<Arc<T>>>
    where
        F: FnOnce(i32) -> Result<Option<T>>,
    {
        if let Some(entry) = self.entries.iter().find(|e| e.index == index) {
            self.stats.hits += 1;
            let value = if self.copy_on_hit {
                Arc::new(T::clone(&entry.value))
            } else {
                Arc::clone(&entry.value)
            };
            return Ok(Some(value));
        }

        self.stats.misses += 1;
        let Some(value) = loader(index)? else {
            return Ok(None);
        };
        let value = Arc::new(value);
        if self.capacity > 0 {
            while self.entries.len() >= self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(CacheEntry {
                index,
                value: Arc::clone(&value),
            });
        }
        Ok(Some(value))
    }
}
