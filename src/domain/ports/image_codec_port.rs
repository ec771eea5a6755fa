//! Port definitions for decoding and encoding images.

use std::io::Write;

use crate::domain::entities::{BoundingBox, ImageRef};
use crate::domain::errors::{DecodeError, EncodeError};

/// Turns sources and cached bytes into pixels.
///
/// Implementations are synchronous and CPU-bound; callers run them on worker
/// threads. A source that cannot be read or is not an image yields `Ok(None)`.
#[cfg_attr(test, mockall::automock)]
pub trait ImageDecoder: Send + Sync {
    /// Decodes `source`, downsampled so that neither dimension exceeds `bounds` by
    /// more than one power-of-two step.
    ///
    /// # Errors
    /// Returns [`DecodeError::OutOfMemory`] if the pixels cannot be allocated.
    fn decode(
        &self,
        source: &ImageRef,
        bounds: BoundingBox,
    ) -> Result<Option<image::DynamicImage>, DecodeError>;

    /// Decodes an encoded blob read back from the disk cache.
    ///
    /// # Errors
    /// Returns [`DecodeError::OutOfMemory`] if the pixels cannot be allocated.
    fn decode_bytes(&self, bytes: &[u8]) -> Result<Option<image::DynamicImage>, DecodeError>;
}

/// Serializes decoded images for the disk cache.
pub trait ImageEncoder: Send + Sync {
    /// Writes `image` to `out`.
    ///
    /// # Errors
    /// Returns an error if encoding or writing fails; the caller discards whatever
    /// was written.
    fn encode(&self, image: &image::DynamicImage, out: &mut dyn Write) -> Result<(), EncodeError>;
}
