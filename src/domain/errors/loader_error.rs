//! Loader error types.

use thiserror::Error;

use super::StoreError;

/// Errors surfaced to callers of the image loader.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum LoaderError {
    #[error("image source is empty")]
    EmptySource,

    #[error("image loader requires a running tokio runtime")]
    NoRuntime,

    #[error("disk cache unavailable at {path}: {source}")]
    StoreUnavailable {
        path: String,
        #[source]
        source: StoreError,
    },
}

impl LoaderError {
    /// Creates store unavailable error.
    #[must_use]
    pub fn store_unavailable(path: &std::path::Path, source: StoreError) -> Self {
        Self::StoreUnavailable {
            path: path.display().to_string(),
            source,
        }
    }

    /// Returns whether the error is caused by caller input.
    #[must_use]
    pub const fn is_invalid_request(&self) -> bool {
        matches!(self, Self::EmptySource)
    }
}
