//! Disk-tier encoders backed by the `image` crate.

use std::io::Write;

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use serde::{Deserialize, Serialize};

use crate::domain::errors::EncodeError;
use crate::domain::ports::ImageEncoder;

/// Default JPEG quality for cached thumbnails.
pub const DEFAULT_QUALITY: u8 = 50;

/// Format cached images are stored in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressFormat {
    /// Lossy JPEG; alpha is dropped.
    #[default]
    Jpeg,
    /// Lossless PNG.
    Png,
    /// Lossless WebP.
    Webp,
}

impl std::fmt::Display for CompressFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jpeg => write!(f, "jpeg"),
            Self::Png => write!(f, "png"),
            Self::Webp => write!(f, "webp"),
        }
    }
}

/// Encodes images in a fixed format and quality.
#[derive(Debug, Clone, Copy)]
pub struct ImageCrateEncoder {
    format: CompressFormat,
    quality: u8,
}

impl ImageCrateEncoder {
    /// Creates an encoder. Quality only affects JPEG and is clamped to 1..=100.
    #[must_use]
    pub fn new(format: CompressFormat, quality: u8) -> Self {
        Self {
            format,
            quality: quality.clamp(1, 100),
        }
    }

    /// Returns the output format.
    #[must_use]
    pub const fn format(&self) -> CompressFormat {
        self.format
    }
}

impl Default for ImageCrateEncoder {
    fn default() -> Self {
        Self::new(CompressFormat::Jpeg, DEFAULT_QUALITY)
    }
}

impl ImageEncoder for ImageCrateEncoder {
    fn encode(&self, image: &DynamicImage, out: &mut dyn Write) -> Result<(), EncodeError> {
        match self.format {
            CompressFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(out, self.quality))?;
            }
            CompressFormat::Png => {
                image.write_with_encoder(PngEncoder::new_with_quality(
                    out,
                    CompressionType::Default,
                    FilterType::Adaptive,
                ))?;
            }
            CompressFormat::Webp => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                rgba.write_with_encoder(WebPEncoder::new_lossless(out))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(CompressFormat::Jpeg ; "jpeg")]
    #[test_case(CompressFormat::Png ; "png")]
    #[test_case(CompressFormat::Webp ; "webp")]
    fn test_encoded_bytes_decode_to_same_dimensions(format: CompressFormat) {
        let encoder = ImageCrateEncoder::new(format, 70);
        let image = DynamicImage::new_rgba8(31, 17);

        let mut out = Vec::new();
        encoder.encode(&image, &mut out).unwrap();

        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (31, 17));
    }

    #[test]
    fn test_quality_is_clamped() {
        let encoder = ImageCrateEncoder::new(CompressFormat::Jpeg, 0);
        assert_eq!(encoder.quality, 1);
        let encoder = ImageCrateEncoder::new(CompressFormat::Jpeg, 200);
        assert_eq!(encoder.quality, 100);
    }
}
