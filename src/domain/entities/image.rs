//! Domain types for image loading and caching.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a fingerprint (hex-encoded to twice as many chars).
const FINGERPRINT_BYTES: usize = 16;

/// Content-addressed cache key derived from an image source identifier.
///
/// The same source string always yields the same fingerprint, in this process and
/// across restarts, so it is safe to use as the key for both cache tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a source identifier.
    ///
    /// Callers reject empty sources before getting here; the function itself is
    /// total and never fails.
    #[must_use]
    pub fn of(source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convenience wrapper around [`Fingerprint::of`].
#[must_use]
pub fn fingerprint(source: &str) -> Fingerprint {
    Fingerprint::of(source)
}

/// Identifies an image to load: a file on disk or an embedded resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageRef {
    /// Image file path.
    File(PathBuf),
    /// Numeric id resolved through a resource bundle.
    Resource(u32),
}

impl ImageRef {
    /// Creates a file reference.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Creates a resource reference.
    #[must_use]
    pub const fn resource(id: u32) -> Self {
        Self::Resource(id)
    }

    /// Returns the string the fingerprint is computed from.
    ///
    /// Resource keys contain a NUL byte, which no file path can, so the two
    /// kinds never share a key.
    #[must_use]
    pub fn source_key(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().into_owned(),
            Self::Resource(id) => format!("resource\0{id}"),
        }
    }

    /// Returns true if there is nothing to load (an empty path).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::File(path) => path.as_os_str().is_empty(),
            Self::Resource(_) => false,
        }
    }

    /// Returns the file path, if this is a file reference.
    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Resource(_) => None,
        }
    }

    /// Computes the cache key for this source.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.source_key())
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Resource(id) => write!(f, "resource:{id}"),
        }
    }
}

impl From<&str> for ImageRef {
    fn from(s: &str) -> Self {
        Self::file(s)
    }
}

impl From<PathBuf> for ImageRef {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Maximum size a decoded image should approximately fit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// Maximum width in pixels.
    pub width: u32,
    /// Maximum height in pixels.
    pub height: u32,
}

impl BoundingBox {
    /// Creates a bounding box. Zero dimensions are raised to one.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width: if width == 0 { 1 } else { width },
            height: if height == 0 { 1 } else { height },
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(50, 50)
    }
}

/// Display status of a surface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageStatus {
    /// Nothing has been requested.
    #[default]
    Empty,
    /// A task is filling the surface; the placeholder is shown.
    Loading,
    /// The decoded image is shown.
    Ready,
    /// Loading failed; the placeholder stays.
    Failed(String),
}

impl ImageStatus {
    /// Returns true if the image is shown.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns true while a task is responsible for the surface.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns true if loading failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A decoded image along with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Cache key of the image.
    pub key: Fingerprint,
    /// Decoded pixels.
    pub image: Arc<image::DynamicImage>,
    /// Where the image was loaded from.
    pub source: ImageSource,
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// Loaded from the in-memory LRU cache.
    MemoryCache,
    /// Loaded from the disk cache.
    DiskCache,
    /// Decoded from the original source.
    Decoder,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Decoder => write!(f, "decoder"),
        }
    }
}
