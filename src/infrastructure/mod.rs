//! Infrastructure layer with adapters for the file system and image codecs.

/// Loader configuration.
pub mod config;
/// Image handling (caching, decoding, loading).
pub mod image;
/// Byte store adapters.
pub mod storage;

pub use config::{CliArgs, ConfigError, LoaderConfig, LogLevel, StorageManager};
pub use image::{
    CacheCoordinator, CacheStats, DiskImageCache, ImageLoader, ImageLoaderConfig, LoadRequest,
    MemoryImageCache, TaskOutcome,
};
pub use storage::FileByteStore;
