mod image_surface;

pub use image_surface::ImageSurface;
