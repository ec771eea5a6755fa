//! Cache and byte store error types.

use thiserror::Error;

/// Byte store error variants.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key {key:?}: keys must match [a-z0-9_-]{{1,120}}")]
    InvalidKey { key: String },

    #[error("slot {slot} out of range for a store with {count} slot(s) per key")]
    SlotOutOfRange { slot: usize, count: usize },

    #[error("edit of new entry {key:?} did not write every slot")]
    IncompleteEdit { key: String },

    #[error("store header is unreadable: {message}")]
    Header { message: String },

    #[error("entry {key:?} of {size} bytes exceeds the store capacity of {max_size} bytes")]
    TooLarge { key: String, size: u64, max_size: u64 },
}

impl StoreError {
    /// Creates invalid key error.
    #[must_use]
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into() }
    }

    /// Creates header error.
    #[must_use]
    pub fn header(message: impl Into<String>) -> Self {
        Self::Header {
            message: message.into(),
        }
    }

    /// Creates too-large error.
    #[must_use]
    pub fn too_large(key: impl Into<String>, size: u64, max_size: u64) -> Self {
        Self::TooLarge {
            key: key.into(),
            size,
            max_size,
        }
    }

    /// Returns whether a retry could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Errors raised by an image encoder.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum EncodeError {
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error while encoding: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoder rejected image: {message}")]
    Rejected { message: String },
}

impl EncodeError {
    /// Creates rejected error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Result type for cache tier operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache tier operations.
///
/// These never escape the coordinator: every tier failure degrades to a cache miss
/// or a skipped write.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum CacheError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("entry {key} is being written by another editor")]
    Busy { key: String },
}

impl CacheError {
    /// Creates busy error.
    #[must_use]
    pub fn busy(key: impl Into<String>) -> Self {
        Self::Busy { key: key.into() }
    }
}
