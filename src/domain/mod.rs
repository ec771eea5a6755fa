//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{Fingerprint, ImageRef, LoadedImage, TaskHandle, TaskId, TaskState};
pub use errors::{CacheError, DecodeError, LoaderError, StoreError};
pub use ports::{ByteStore, DisplaySurface, ImageDecoder, ImageEncoder, ImageLoaderPort};
