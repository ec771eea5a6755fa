//! In-memory LRU image cache bounded by decoded byte cost.

use std::sync::Arc;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::entities::Fingerprint;

/// Default memory class in MiB when the caller provides no budget.
pub const DEFAULT_MEMORY_CLASS_MB: u64 = 64;

/// Default share of the memory class given to the cache (1/8th).
pub const DEFAULT_FRACTION_DIVISOR: u32 = 8;

const MIB: u64 = 1024 * 1024;

/// How much memory the cache may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBudget {
    /// Explicit capacity in bytes.
    Bytes(u64),
    /// `1 / divisor` of a memory class expressed in MiB.
    FractionOfClass {
        /// Memory class in MiB.
        class_mb: u64,
        /// Divisor applied to the class.
        divisor: u32,
    },
}

impl MemoryBudget {
    /// Resolves the budget to a byte capacity.
    #[must_use]
    pub fn capacity_bytes(self) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::FractionOfClass { class_mb, divisor } => {
                class_mb.saturating_mul(MIB) / u64::from(divisor.max(1))
            }
        }
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::FractionOfClass {
            class_mb: DEFAULT_MEMORY_CLASS_MB,
            divisor: DEFAULT_FRACTION_DIVISOR,
        }
    }
}

/// Returns the number of bytes a decoded image occupies.
#[must_use]
pub fn image_cost(image: &image::DynamicImage) -> u64 {
    image.as_bytes().len() as u64
}

struct CachedImage {
    image: Arc<image::DynamicImage>,
    cost: u64,
}

/// LRU cache for decoded images, evicting by total byte cost.
///
/// Not internally synchronized; the cache coordinator serializes access.
pub struct MemoryImageCache {
    cache: LruCache<Fingerprint, CachedImage>,
    capacity: u64,
    cost: u64,
    hits: u64,
    misses: u64,
}

impl MemoryImageCache {
    /// Creates a new cache with the given byte capacity.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: LruCache::unbounded(),
            capacity,
            cost: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Creates a cache sized from a memory budget.
    #[must_use]
    pub fn with_budget(budget: MemoryBudget) -> Self {
        let capacity = budget.capacity_bytes();
        debug!(capacity, ?budget, "Sized memory image cache");
        Self::new(capacity)
    }

    /// Returns the image for `key`, marking it most recently used.
    pub fn get(&mut self, key: &Fingerprint) -> Option<Arc<image::DynamicImage>> {
        if let Some(entry) = self.cache.get(key) {
            self.hits += 1;
            trace!(key = %key, "Memory cache hit");
            Some(entry.image.clone())
        } else {
            self.misses += 1;
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    /// Returns the image for `key` without touching recency or statistics.
    #[must_use]
    pub fn peek(&self, key: &Fingerprint) -> Option<Arc<image::DynamicImage>> {
        self.cache.peek(key).map(|entry| entry.image.clone())
    }

    /// Returns true if `key` is resident.
    #[must_use]
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.cache.contains(key)
    }

    /// Stores an image, evicting least recently used entries until it fits.
    ///
    /// An image costing more than the whole capacity is not inserted and nothing
    /// is evicted for it. Returns whether the image is now resident.
    pub fn put(&mut self, key: Fingerprint, image: Arc<image::DynamicImage>) -> bool {
        let cost = image_cost(&image);
        if cost > self.capacity {
            debug!(key = %key, cost, capacity = self.capacity, "Image larger than memory cache, skipping");
            return false;
        }

        if let Some(previous) = self.cache.pop(&key) {
            self.cost -= previous.cost;
        }
        while self.cost + cost > self.capacity {
            let Some((evicted, entry)) = self.cache.pop_lru() else {
                break;
            };
            self.cost -= entry.cost;
            debug!(key = %evicted, cost = entry.cost, "Evicted image from memory cache");
        }

        debug!(key = %key, cost, "Storing image in memory cache");
        self.cache.put(key, CachedImage { image, cost });
        self.cost += cost;
        true
    }

    /// Removes `key`. Returns whether it was resident.
    pub fn evict(&mut self, key: &Fingerprint) -> bool {
        if let Some(entry) = self.cache.pop(key) {
            self.cost -= entry.cost;
            debug!(key = %key, "Evicted image from memory cache");
            true
        } else {
            false
        }
    }

    /// Evicts least recently used entries until at most `target` bytes remain.
    /// Returns the number of entries evicted.
    pub fn trim_to(&mut self, target: u64) -> usize {
        let mut evicted = 0;
        while self.cost > target {
            let Some((_, entry)) = self.cache.pop_lru() else {
                break;
            };
            self.cost -= entry.cost;
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, remaining = self.cost, "Trimmed memory image cache");
        }
        evicted
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.cost = 0;
        debug!("Cleared memory image cache");
    }

    /// Returns the number of resident images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if nothing is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Returns the summed cost of resident images.
    #[must_use]
    pub const fn cost(&self) -> u64 {
        self.cost
    }

    /// Returns the configured capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            size: self.len(),
            cost: self.cost,
            capacity: self.capacity,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_budget(MemoryBudget::default())
    }
}

/// Statistics about memory cache performance.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Bytes held by cached images.
    pub cost: u64,
    /// Capacity in bytes.
    pub capacity: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({}/{} bytes), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.cost, self.capacity, self.hit_rate, self.hits, self.misses
        )
    }
}
