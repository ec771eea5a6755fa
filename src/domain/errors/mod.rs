//! Domain error types.

mod cache_error;
mod decode_error;
mod loader_error;

pub use cache_error::{CacheError, CacheResult, EncodeError, StoreError};
pub use decode_error::DecodeError;
pub use loader_error::LoaderError;
