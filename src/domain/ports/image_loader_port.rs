//! Port definition for loading images without a display surface.

use crate::domain::entities::{ImageRef, LoadedImage};
use crate::domain::errors::LoaderError;

/// Loads images through the cache hierarchy.
#[async_trait::async_trait]
pub trait ImageLoaderPort: Send + Sync {
    /// Loads an image, checking memory then disk before decoding.
    /// Returns `Ok(None)` when the source cannot be decoded.
    async fn load(&self, source: &ImageRef) -> Result<Option<LoadedImage>, LoaderError>;

    /// Warms the caches for `source` without waiting for the result.
    fn prefetch(&self, source: ImageRef);

    /// Returns true if `source` is present in either cache tier.
    fn is_cached(&self, source: &ImageRef) -> bool;
}
