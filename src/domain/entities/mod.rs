//! Domain entity definitions.

mod image;
mod task;

pub use image::{
    BoundingBox, Fingerprint, ImageRef, ImageSource, ImageStatus, LoadedImage, fingerprint,
};
pub use task::{TaskControl, TaskHandle, TaskId, TaskState};
