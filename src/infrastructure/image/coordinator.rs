//! Two-tier cache coordinator.
//!
//! Owns the memory and disk tiers and presents them as one cache keyed by
//! fingerprint. Lookups go memory first, then disk; writes go to both tiers
//! independently.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::domain::entities::{Fingerprint, ImageSource, LoadedImage};
use crate::domain::errors::{DecodeError, StoreError};
use crate::domain::ports::ImageDecoder;

use super::disk_cache::DiskImageCache;
use super::memory_cache::{CacheStats, MemoryImageCache};

/// Outcome of writing an image to both tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierWrites {
    /// Image is resident in memory.
    pub memory: bool,
    /// Image was committed to disk.
    pub disk: bool,
}

/// Snapshot of both tiers.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    /// Whether caching is enabled at all.
    pub enabled: bool,
    /// Memory tier statistics.
    pub memory: CacheStats,
    /// Bytes stored on disk, if a disk tier exists.
    pub disk_size: Option<u64>,
    /// Disk tier capacity, if a disk tier exists.
    pub disk_capacity: Option<u64>,
}

impl std::fmt::Display for CoordinatorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.enabled {
            return write!(f, "Caching disabled");
        }
        write!(f, "{}", self.memory)?;
        match (self.disk_size, self.disk_capacity) {
            (Some(size), Some(capacity)) => write!(f, "; Disk: {size}/{capacity} bytes"),
            _ => write!(f, "; Disk: off"),
        }
    }
}

/// Unified get/put over the memory and disk tiers.
///
/// The memory tier sits behind the coordinator's mutex. The disk tier's byte
/// store synchronizes itself, so disk I/O and encoding never hold the memory
/// lock, and decoding of disk bytes happens outside every lock.
pub struct CacheCoordinator {
    memory: Mutex<MemoryImageCache>,
    disk: Option<DiskImageCache>,
    decoder: Arc<dyn ImageDecoder>,
    enabled: bool,
}

impl CacheCoordinator {
    /// Creates a coordinator over the given tiers.
    #[must_use]
    pub fn new(
        memory: MemoryImageCache,
        disk: Option<DiskImageCache>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        Self {
            memory: Mutex::new(memory),
            disk,
            decoder,
            enabled: true,
        }
    }

    /// Creates a coordinator in bypass mode: every lookup misses and every
    /// write is dropped.
    #[must_use]
    pub fn disabled(decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            memory: Mutex::new(MemoryImageCache::new(0)),
            disk: None,
            decoder,
            enabled: false,
        }
    }

    /// Returns whether caching is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether a disk tier is attached.
    #[must_use]
    pub const fn has_disk_tier(&self) -> bool {
        self.disk.is_some()
    }

    /// Returns the disk tier, if attached.
    #[must_use]
    pub const fn disk(&self) -> Option<&DiskImageCache> {
        self.disk.as_ref()
    }

    /// Looks up the memory tier only, marking a hit most recently used.
    #[must_use]
    pub fn get_memory(&self, key: &Fingerprint) -> Option<LoadedImage> {
        if !self.enabled {
            return None;
        }
        let image = self.memory.lock().get(key)?;
        Some(LoadedImage {
            key: key.clone(),
            image,
            source: ImageSource::MemoryCache,
        })
    }

    /// Looks up memory, then disk.
    ///
    /// A disk hit is decoded but not inserted into memory; promotion is left to
    /// the caller. Undecodable disk bytes count as a miss and are evicted.
    ///
    /// # Errors
    /// Returns [`DecodeError::OutOfMemory`] if decoding a disk hit runs out of
    /// memory.
    pub fn get_image(&self, key: &Fingerprint) -> Result<Option<LoadedImage>, DecodeError> {
        if let Some(hit) = self.get_memory(key) {
            return Ok(Some(hit));
        }
        let Some(disk) = self.disk.as_ref().filter(|_| self.enabled) else {
            return Ok(None);
        };
        let Some(bytes) = disk.get_bytes(key) else {
            return Ok(None);
        };
        match self.decoder.decode_bytes(&bytes)? {
            Some(image) => {
                trace!(key = %key, "Decoded image from disk cache");
                Ok(Some(LoadedImage {
                    key: key.clone(),
                    image: Arc::new(image),
                    source: ImageSource::DiskCache,
                }))
            }
            None => {
                warn!(key = %key, "Disk cache entry is not a decodable image, evicting");
                disk.evict(key);
                Ok(None)
            }
        }
    }

    /// Inserts into the memory tier only.
    pub fn promote(&self, key: &Fingerprint, image: Arc<image::DynamicImage>) -> bool {
        if !self.enabled {
            return false;
        }
        self.memory.lock().put(key.clone(), image)
    }

    /// Writes `image` to both tiers, best effort. A failure in one tier does not
    /// undo the other.
    pub fn put_image(&self, key: &Fingerprint, image: &Arc<image::DynamicImage>) -> TierWrites {
        if !self.enabled {
            return TierWrites::default();
        }
        let memory = self.promote(key, image.clone());
        let disk = self.disk.as_ref().is_some_and(|disk| match disk.put(key, image) {
            Ok(()) => true,
            Err(e) => {
                debug!(key = %key, error = %e, "Skipped disk cache write");
                false
            }
        });
        TierWrites { memory, disk }
    }

    /// Returns true if `key` is in either tier.
    #[must_use]
    pub fn has(&self, key: &Fingerprint) -> bool {
        if !self.enabled {
            return false;
        }
        self.memory.lock().contains(key) || self.disk.as_ref().is_some_and(|d| d.contains(key))
    }

    /// Releases cached pixels after a decode ran out of memory: trims the memory
    /// tier to half its capacity. Returns the number of evicted images.
    pub fn relieve_memory_pressure(&self) -> usize {
        let mut memory = self.memory.lock();
        let target = memory.capacity() / 2;
        let evicted = memory.trim_to(target);
        debug!(evicted, target, "Relieved memory pressure");
        evicted
    }

    /// Empties both tiers.
    ///
    /// Not serialized against in-flight disk writes.
    ///
    /// # Errors
    /// Returns error if the disk tier cannot be emptied. The memory tier is
    /// cleared regardless.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.memory.lock().clear();
        if let Some(disk) = &self.disk {
            disk.clear()?;
        }
        Ok(())
    }

    /// Returns statistics for both tiers.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            enabled: self.enabled,
            memory: self.memory.lock().stats(),
            disk_size: self.disk.as_ref().map(DiskImageCache::size),
            disk_capacity: self.disk.as_ref().map(DiskImageCache::max_size),
        }
    }

    /// Returns the decoder shared with decode tasks.
    #[must_use]
    pub fn decoder(&self) -> Arc<dyn ImageDecoder> {
        self.decoder.clone()
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("enabled", &self.enabled)
            .field("disk", &self.disk)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ByteStore;
    use crate::domain::ports::mocks::{MemoryByteStore, MockImageDecoder};
    use crate::infrastructure::image::decoder::SampledDecoder;
    use crate::infrastructure::image::encoder::ImageCrateEncoder;
    use std::io::Write;

    fn rgb(side: u32) -> Arc<image::DynamicImage> {
        Arc::new(image::DynamicImage::new_rgb8(side, side))
    }

    fn disk(store: &MemoryByteStore) -> DiskImageCache {
        DiskImageCache::new(
            Arc::new(store.clone()),
            Arc::new(ImageCrateEncoder::default()),
        )
    }

    fn coordinator(store: &MemoryByteStore) -> CacheCoordinator {
        CacheCoordinator::new(
            MemoryImageCache::new(1_000_000),
            Some(disk(store)),
            Arc::new(SampledDecoder::new()),
        )
    }

    #[test]
    fn test_put_writes_both_tiers() {
        let store = MemoryByteStore::new();
        let coordinator = coordinator(&store);
        let key = Fingerprint::of("/a.png");

        let writes = coordinator.put_image(&key, &rgb(10));

        assert_eq!(writes, TierWrites { memory: true, disk: true });
        assert!(coordinator.has(&key));
        assert_eq!(store.len(), 1);
        let hit = coordinator.get_image(&key).unwrap().unwrap();
        assert_eq!(hit.source, ImageSource::MemoryCache);
    }

    #[test]
    fn test_disk_hit_is_not_promoted() {
        let store = MemoryByteStore::new();
        disk(&store).put(&Fingerprint::of("/b.png"), &rgb(12)).unwrap();
        let coordinator = coordinator(&store);
        let key = Fingerprint::of("/b.png");

        let hit = coordinator.get_image(&key).unwrap().unwrap();
        assert_eq!(hit.source, ImageSource::DiskCache);
        assert_eq!((hit.image.width(), hit.image.height()), (12, 12));
        assert!(coordinator.get_memory(&key).is_none());

        assert!(coordinator.promote(&key, hit.image));
        let hit = coordinator.get_image(&key).unwrap().unwrap();
        assert_eq!(hit.source, ImageSource::MemoryCache);
    }

    #[test]
    fn test_disk_write_over_capacity_is_reported() {
        let temp = tempfile::TempDir::new().unwrap();
        let disk =
            DiskImageCache::open(temp.path(), 10, Arc::new(ImageCrateEncoder::default())).unwrap();
        let coordinator = CacheCoordinator::new(
            MemoryImageCache::new(1_000_000),
            Some(disk),
            Arc::new(SampledDecoder::new()),
        );

        let writes = coordinator.put_image(&Fingerprint::of("/big.png"), &rgb(8));

        assert_eq!(writes, TierWrites { memory: true, disk: false });
    }

    #[test]
    fn test_corrupt_disk_entry_is_evicted() {
        let store = MemoryByteStore::new();
        let key = Fingerprint::of("/corrupt.png");
        let mut editor = store.edit(key.as_str()).unwrap().unwrap();
        editor.output(0).unwrap().write_all(b"not an image").unwrap();
        editor.commit().unwrap();
        let coordinator = coordinator(&store);

        assert!(coordinator.get_image(&key).unwrap().is_none());
        assert_eq!(store.len(), 0);
        assert!(!coordinator.has(&key));
    }

    #[test]
    fn test_oversized_image_still_reaches_disk() {
        let store = MemoryByteStore::new();
        let coordinator = CacheCoordinator::new(
            MemoryImageCache::new(10),
            Some(disk(&store)),
            Arc::new(SampledDecoder::new()),
        );
        let key = Fingerprint::of("/huge.png");

        let writes = coordinator.put_image(&key, &rgb(20));

        assert_eq!(writes, TierWrites { memory: false, disk: true });
        assert!(coordinator.has(&key));
    }

    #[test]
    fn test_memory_hit_skips_disk_and_decoder() {
        let mut decoder = MockImageDecoder::new();
        decoder.expect_decode_bytes().times(0);
        decoder.expect_decode().times(0);
        let coordinator =
            CacheCoordinator::new(MemoryImageCache::new(1_000_000), None, Arc::new(decoder));
        let key = Fingerprint::of("/c.png");
        coordinator.promote(&key, rgb(4));

        let hit = coordinator.get_image(&key).unwrap().unwrap();
        assert_eq!(hit.source, ImageSource::MemoryCache);
    }

    #[test]
    fn test_disabled_reads_and_writes_nothing() {
        let coordinator = CacheCoordinator::disabled(Arc::new(SampledDecoder::new()));
        let key = Fingerprint::of("/d.png");

        assert_eq!(coordinator.put_image(&key, &rgb(4)), TierWrites::default());
        assert!(!coordinator.has(&key));
        assert!(coordinator.get_image(&key).unwrap().is_none());
        assert!(!coordinator.stats().enabled);
    }

    #[test]
    fn test_relieve_memory_pressure_halves_residency() {
        // Each rgb(10) costs 300 bytes.
        let coordinator = CacheCoordinator::new(
            MemoryImageCache::new(1200),
            None,
            Arc::new(SampledDecoder::new()),
        );
        for name in ["1", "2", "3", "4"] {
            coordinator.promote(&Fingerprint::of(name), rgb(10));
        }

        assert_eq!(coordinator.relieve_memory_pressure(), 2);
        assert!(coordinator.stats().memory.cost <= 600);
        assert!(coordinator.get_memory(&Fingerprint::of("4")).is_some());
        assert!(coordinator.get_memory(&Fingerprint::of("1")).is_none());
    }

    #[test]
    fn test_clear_empties_both_tiers() {
        let store = MemoryByteStore::new();
        let coordinator = coordinator(&store);
        let key = Fingerprint::of("/e.png");
        coordinator.put_image(&key, &rgb(6));

        coordinator.clear().unwrap();

        assert!(!coordinator.has(&key));
        assert_eq!(store.len(), 0);
        let stats = coordinator.stats();
        assert_eq!(stats.memory.size, 0);
        assert_eq!(stats.disk_size, Some(0));
    }

    #[test]
    fn test_stats_display() {
        let coordinator = CacheCoordinator::new(
            MemoryImageCache::new(100),
            None,
            Arc::new(SampledDecoder::new()),
        );
        assert!(coordinator.stats().to_string().ends_with("; Disk: off"));
        let disabled = CacheCoordinator::disabled(Arc::new(SampledDecoder::new()));
        assert_eq!(disabled.stats().to_string(), "Caching disabled");
    }
}
