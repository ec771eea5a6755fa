//! Bounds-aware image decoding.
//!
//! The decoder probes the header for dimensions before touching pixel data, picks
//! a power-of-two sample size for the requested box, and decodes under an
//! allocation limit so an oversized image reports out-of-memory instead of
//! taking the process down.

use std::collections::HashMap;
use std::io::{BufRead, Cursor, Seek};

use bytes::Bytes;
use image::error::LimitErrorKind;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader, Limits};
use tracing::{debug, trace, warn};

use crate::domain::entities::{BoundingBox, ImageRef};
use crate::domain::errors::DecodeError;
use crate::domain::ports::ImageDecoder;

/// Encoded images addressable by numeric id.
#[derive(Debug, Clone, Default)]
pub struct ResourceBundle {
    resources: HashMap<u32, Bytes>,
}

impl ResourceBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers encoded bytes under `id`, replacing any previous resource.
    pub fn insert(&mut self, id: u32, bytes: impl Into<Bytes>) {
        self.resources.insert(id, bytes.into());
    }

    /// Returns the encoded bytes for `id`.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<Bytes> {
        self.resources.get(&id).cloned()
    }

    /// Returns the number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if no resources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Returns the power-of-two sample size for decoding a `width` × `height` image
/// into `bounds`.
///
/// The result is 1 when the image already fits. Otherwise it is the largest power
/// of two not above the rounded ratio of the more oversized axis, which keeps
/// both sampled dimensions under twice the requested box.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn sample_size(width: u32, height: u32, bounds: BoundingBox) -> u32 {
    if width <= bounds.width && height <= bounds.height {
        return 1;
    }
    let width_ratio = (f64::from(width) / f64::from(bounds.width)).round();
    let height_ratio = (f64::from(height) / f64::from(bounds.height)).round();
    let ratio = (width_ratio.max(height_ratio) as u32).max(1);
    1 << (u32::BITS - 1 - ratio.leading_zeros())
}

/// Default decoder: files and bundled resources through the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct SampledDecoder {
    resources: ResourceBundle,
    max_alloc: Option<u64>,
}

impl SampledDecoder {
    /// Creates a decoder with the `image` crate's default allocation limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum bytes a single decode may allocate.
    #[must_use]
    pub const fn with_max_alloc(mut self, max_alloc: Option<u64>) -> Self {
        self.max_alloc = max_alloc;
        self
    }

    /// Sets the resources `ImageRef::Resource` ids resolve against.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceBundle) -> Self {
        self.resources = resources;
        self
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        if let Some(max_alloc) = self.max_alloc {
            limits.max_alloc = Some(max_alloc);
        }
        limits
    }

    fn decode_sampled<R, F>(
        &self,
        id: &str,
        open: F,
        bounds: BoundingBox,
    ) -> Result<Option<DynamicImage>, DecodeError>
    where
        R: BufRead + Seek,
        F: Fn() -> std::io::Result<ImageReader<R>>,
    {
        let dimensions = open()
            .map_err(ImageError::IoError)
            .and_then(ImageReader::into_dimensions);
        let (width, height) = match dimensions {
            Ok(dimensions) => dimensions,
            Err(e) => {
                debug!(source = id, error = %e, "Source is not a decodable image");
                return Ok(None);
            }
        };

        let sample = sample_size(width, height, bounds);
        trace!(source = id, width, height, sample, "Computed sample size");

        let mut reader = match open() {
            Ok(reader) => reader,
            Err(e) => {
                debug!(source = id, error = %e, "Source vanished between probe and decode");
                return Ok(None);
            }
        };
        reader.limits(self.limits());
        let image = match reader.decode() {
            Ok(image) => image,
            Err(e) => return classify(id, e),
        };

        if sample == 1 {
            return Ok(Some(image));
        }
        let target_width = (width / sample).max(1);
        let target_height = (height / sample).max(1);
        Ok(Some(image.resize_exact(
            target_width,
            target_height,
            FilterType::Triangle,
        )))
    }
}

fn classify(id: &str, error: ImageError) -> Result<Option<DynamicImage>, DecodeError> {
    match error {
        ImageError::Limits(limit) if matches!(limit.kind(), LimitErrorKind::InsufficientMemory) => {
            warn!(source = id, "Decode exceeded the allocation limit");
            Err(DecodeError::out_of_memory(id))
        }
        other => {
            debug!(source = id, error = %other, "Failed to decode image");
            Ok(None)
        }
    }
}

impl ImageDecoder for SampledDecoder {
    fn decode(
        &self,
        source: &ImageRef,
        bounds: BoundingBox,
    ) -> Result<Option<DynamicImage>, DecodeError> {
        let id = source.to_string();
        match source {
            ImageRef::File(path) => self.decode_sampled(
                &id,
                || ImageReader::open(path)?.with_guessed_format(),
                bounds,
            ),
            ImageRef::Resource(resource) => {
                let Some(bytes) = self.resources.get(*resource) else {
                    debug!(source = %id, "Unknown resource id");
                    return Ok(None);
                };
                self.decode_sampled(
                    &id,
                    || ImageReader::new(Cursor::new(bytes.clone())).with_guessed_format(),
                    bounds,
                )
            }
        }
    }

    fn decode_bytes(&self, bytes: &[u8]) -> Result<Option<DynamicImage>, DecodeError> {
        let mut reader = match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
            Ok(reader) => reader,
            Err(e) => {
                debug!(error = %e, "Cached bytes are unreadable");
                return Ok(None);
            }
        };
        reader.limits(self.limits());
        match reader.decode() {
            Ok(image) => Ok(Some(image)),
            Err(e) => classify("cached entry", e),
        }
    }
}
