//! Disk-based image cache for persistence across sessions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, trace, warn};

use crate::domain::entities::Fingerprint;
use crate::domain::errors::{CacheError, CacheResult, StoreError};
use crate::domain::ports::{ByteStore, ImageEncoder};
use crate::infrastructure::storage::FileByteStore;

/// Maximum disk cache size in bytes (10 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 10 * 1024 * 1024;

/// Default subdirectory under the cache root.
pub const DEFAULT_SUBDIRECTORY: &str = "thumbnails";

/// On-disk format version. Bumping it discards every cached entry.
pub const STORE_VERSION: u32 = 1;

/// Slot holding the encoded image.
const IMAGE_SLOT: usize = 0;

/// Disk tier: encoded images in a [`ByteStore`], one slot per fingerprint.
///
/// Every operation is blocking; callers on an async runtime run it on a
/// blocking worker.
pub struct DiskImageCache {
    store: Arc<dyn ByteStore>,
    encoder: Arc<dyn ImageEncoder>,
}

impl DiskImageCache {
    /// Creates a disk cache over an already opened store.
    #[must_use]
    pub fn new(store: Arc<dyn ByteStore>, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self { store, encoder }
    }

    /// Opens a [`FileByteStore`] in `directory`.
    ///
    /// # Errors
    /// Returns error if the store cannot be opened.
    pub fn open(
        directory: impl Into<PathBuf>,
        max_size: u64,
        encoder: Arc<dyn ImageEncoder>,
    ) -> Result<Self, StoreError> {
        let store = FileByteStore::open(directory, STORE_VERSION, 1, max_size)?;
        Ok(Self::new(Arc::new(store), encoder))
    }

    /// Gets encoded image bytes. I/O failures are logged and reported as a miss.
    #[must_use]
    pub fn get_bytes(&self, key: &Fingerprint) -> Option<Vec<u8>> {
        let mut snapshot = match self.store.get(key.as_str()) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                trace!(key = %key, "Disk cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache read failed");
                return None;
            }
        };
        match snapshot.read_slot(IMAGE_SLOT) {
            Ok(bytes) => {
                trace!(key = %key, size = bytes.len(), "Disk cache hit");
                Some(bytes)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache entry unreadable");
                None
            }
        }
    }

    /// Encodes `image` and stores it under `key`.
    ///
    /// On failure the edit is aborted and the previous value, if any, stays intact.
    ///
    /// # Errors
    /// Returns [`CacheError::Busy`] if another writer holds the key, or the store or
    /// encoder error that aborted the write.
    pub fn put(&self, key: &Fingerprint, image: &DynamicImage) -> CacheResult<()> {
        let Some(mut editor) = self.store.edit(key.as_str())? else {
            return Err(CacheError::busy(key.as_str()));
        };

        let written = editor
            .output(IMAGE_SLOT)
            .map_err(CacheError::from)
            .and_then(|out| {
                self.encoder.encode(image, out)?;
                out.flush().map_err(StoreError::from)?;
                Ok(())
            });

        match written {
            Ok(()) => {
                editor.commit()?;
                if let Err(e) = self.store.flush() {
                    warn!(key = %key, error = %e, "Disk cache flush failed after commit");
                }
                debug!(key = %key, size = self.store.size(), "Stored image in disk cache");
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = editor.abort() {
                    debug!(key = %key, error = %abort, "Abort after failed write also failed");
                }
                warn!(key = %key, error = %e, "Disk cache write aborted");
                Err(e)
            }
        }
    }

    /// Checks if an image is cached.
    #[must_use]
    pub fn contains(&self, key: &Fingerprint) -> bool {
        matches!(self.store.get(key.as_str()), Ok(Some(_)))
    }

    /// Removes an image from disk cache.
    pub fn evict(&self, key: &Fingerprint) -> bool {
        match self.store.remove(key.as_str()) {
            Ok(removed) => {
                if removed {
                    debug!(key = %key, "Evicted from disk cache");
                }
                removed
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to evict from disk cache");
                false
            }
        }
    }

    /// Clears the entire disk cache.
    ///
    /// Not serialized against concurrent `get`/`put`; callers must ensure no
    /// writes are in flight.
    ///
    /// # Errors
    /// Returns error if the store cannot be emptied.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.delete()?;
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.store.size()
    }

    /// Returns the configured maximum size in bytes.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.store.max_size()
    }

    /// Returns the directory backing the cache, if it is file-backed.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.store.directory()
    }
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("directory", &self.directory())
            .field("size", &self.size())
            .field("max_size", &self.max_size())
            .finish_non_exhaustive()
    }
}

/// Chooses the cache directory: `external` if it exists and is writable,
/// otherwise the platform cache directory, joined with `subdirectory`.
#[must_use]
pub fn resolve_cache_dir(external: Option<&Path>, subdirectory: &str) -> PathBuf {
    if let Some(external) = external
        && is_writable_dir(external)
    {
        return external.join(subdirectory);
    }
    if let Some(external) = external {
        debug!(dir = %external.display(), "External cache dir unusable, using internal");
    }
    internal_cache_root().join(subdirectory)
}

fn is_writable_dir(dir: &Path) -> bool {
    dir.is_dir() && tempfile::tempfile_in(dir).is_ok()
}

/// Returns the platform cache root for the application.
#[must_use]
pub fn internal_cache_root() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "asyncloader").map_or_else(
        || std::env::temp_dir().join("asyncloader").join("cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}
