//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction by byte cost
//! - Disk caching through a versioned byte store
//! - Bounds-aware decoding and pluggable encoding
//! - Decode tasks with cooperative cancellation and the loader that runs them

pub mod coordinator;
pub mod decoder;
pub mod disk_cache;
pub mod encoder;
pub mod loader;
pub mod memory_cache;
pub mod reuse_guard;
pub mod task;

pub use coordinator::{CacheCoordinator, CoordinatorStats, TierWrites};
pub use decoder::{ResourceBundle, SampledDecoder, sample_size};
pub use disk_cache::{DiskImageCache, resolve_cache_dir};
pub use encoder::{CompressFormat, ImageCrateEncoder};
pub use loader::{ImageLoader, ImageLoaderConfig, LoadRequest, PendingLoad};
pub use memory_cache::{CacheStats, MemoryBudget, MemoryImageCache};
pub use reuse_guard::{GuardDecision, cancel_potential_load};
pub use task::{DecodeTask, TaskOutcome};
