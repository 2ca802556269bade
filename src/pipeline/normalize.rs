//! Image normalization: any supported raster → bounded RGB JPEG.
//!
//! Every image that ends up in a report goes through here, so the content
//! pages only ever embed baseline JPEGs that PDF readers can show with a
//! plain `DCTDecode` filter.

use crate::error::ImageError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Resize/encode parameters. Taken from [`crate::PipelineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Bounding box edge in pixels.
    pub max_dimension: u32,
    /// JPEG quality (1–100).
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            jpeg_quality: 75,
        }
    }
}

/// A decoded, bounded, re-encoded image ready for embedding.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Position in the job's input list.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Baseline JPEG bytes, 3 components, 8 bits.
    pub jpeg: Vec<u8>,
}

/// Decode `bytes`, shrink into the bounding box, re-encode as JPEG.
///
/// Images already inside the box keep their pixel size. Alpha is dropped
/// (flattened by conversion to RGB).
pub fn normalize(
    index: usize,
    bytes: &[u8],
    opts: &NormalizeOptions,
) -> Result<NormalizedImage, ImageError> {
    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Decode {
        index,
        detail: e.to_string(),
    })?;

    let (src_w, src_h) = (img.width(), img.height());
    let img = if src_w > opts.max_dimension || src_h > opts.max_dimension {
        img.resize(opts.max_dimension, opts.max_dimension, FilterType::Triangle)
    } else {
        img
    };

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let (width, height) = (rgb.width(), rgb.height());

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, opts.jpeg_quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| ImageError::Encode {
            index,
            detail: e.to_string(),
        })?;

    debug!(
        "Image {}: {}x{} → {}x{} ({} → {} bytes)",
        index,
        src_w,
        src_h,
        width,
        height,
        bytes.len(),
        jpeg.len()
    );

    Ok(NormalizedImage {
        index,
        width,
        height,
        jpeg,
    })
}

/// [`normalize`] on the blocking pool.
pub async fn normalize_blocking(
    index: usize,
    bytes: Vec<u8>,
    opts: NormalizeOptions,
) -> Result<NormalizedImage, ImageError> {
    tokio::task::spawn_blocking(move || normalize(index, &bytes, &opts))
        .await
        .map_err(|e| ImageError::Encode {
            index,
            detail: format!("normalize task failed: {e}"),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([10, 200, 30, 128])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn large_image_fits_inside_box() {
        let out = normalize(0, &png(3000, 1500), &NormalizeOptions::default()).unwrap();
        assert_eq!((out.width, out.height), (1024, 512));
        assert_eq!(&out.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn portrait_keeps_aspect_ratio() {
        let out = normalize(0, &png(600, 2400), &NormalizeOptions::default()).unwrap();
        assert_eq!(out.height, 1024);
        assert_eq!(out.width, 256);
    }

    #[test]
    fn small_image_is_not_enlarged() {
        let out = normalize(2, &png(10, 10), &NormalizeOptions::default()).unwrap();
        assert_eq!((out.width, out.height), (10, 10));
        assert_eq!(out.index, 2);

        let decoded = image::load_from_memory(&out.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[test]
    fn output_is_rgb_jpeg() {
        let out = normalize(0, &png(40, 20), &NormalizeOptions::default()).unwrap();
        let decoded = image::load_from_memory_with_format(&out.jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn jpeg_input_is_accepted() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([1, 2, 3])));
        let mut buf = Vec::new();
        src.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        let out = normalize(0, &buf, &NormalizeOptions::default()).unwrap();
        assert_eq!((out.width, out.height), (64, 32));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = normalize(5, b"definitely not an image", &NormalizeOptions::default())
            .unwrap_err();
        assert!(matches!(err, ImageError::Decode { index: 5, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn blocking_variant_matches() {
        let out = normalize_blocking(1, png(2048, 2048), NormalizeOptions::default())
            .await
            .unwrap();
        assert_eq!((out.width, out.height), (1024, 1024));
    }
}
