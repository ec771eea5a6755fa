//! Decode error types.

use thiserror::Error;

/// Decoder failures that are not simply "this is not an image".
///
/// Unreadable or unsupported sources are not errors: decoders report them as an
/// absent image.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum DecodeError {
    #[error("out of memory while decoding {id}")]
    OutOfMemory { id: String },

    #[error("decode worker failed: {message}")]
    Worker { message: String },
}

impl DecodeError {
    /// Creates out-of-memory error.
    #[must_use]
    pub fn out_of_memory(id: impl Into<String>) -> Self {
        Self::OutOfMemory { id: id.into() }
    }

    /// Creates worker error.
    #[must_use]
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Returns whether the failure stems from memory exhaustion.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}
