mod byte_store_port;
mod display_surface_port;
mod image_codec_port;
mod image_loader_port;

pub use byte_store_port::{ByteStore, StoreEditor, StoreResult, StoreSnapshot, is_valid_key};
pub use display_surface_port::DisplaySurface;
pub use image_codec_port::{ImageDecoder, ImageEncoder};
pub use image_loader_port::ImageLoaderPort;
