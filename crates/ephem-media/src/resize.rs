//! Resize math and encoding.
//!
//! `fit_dimensions` is pure and testable without any I/O or images; the
//! encode/decode helpers wrap the `image` crate and run on blocking threads
//! in the callers.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};

use ephem_models::ImageFormat;

use crate::error::{MediaError, MediaResult};

/// JPEG re-encode quality for derivatives.
pub const JPEG_QUALITY: u8 = 85;

/// Calculate output dimensions that fit inside a bounding box.
///
/// Preserves the source aspect ratio and never upscales: a source already
/// inside the box keeps its dimensions.
pub fn fit_dimensions(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w == 0 || src_h == 0 {
        return (src_w, src_h);
    }
    if src_w <= max_w && src_h <= max_h {
        return (src_w, src_h);
    }

    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).max(1);
    let h = ((src_h as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Resize an image to fit inside a bounding box, preserving aspect ratio.
///
/// Returns the input unchanged when it already fits.
pub fn resize_to_fit(img: DynamicImage, bounds: (u32, u32)) -> DynamicImage {
    let (w, h) = fit_dimensions((img.width(), img.height()), bounds);
    if (w, h) == (img.width(), img.height()) {
        return img;
    }
    img.resize_exact(w, h, FilterType::Lanczos3)
}

/// Encode an image into the given output format at [`JPEG_QUALITY`].
pub fn encode(img: &DynamicImage, format: ImageFormat) -> MediaResult<Vec<u8>> {
    encode_with_quality(img, format, JPEG_QUALITY)
}

/// Encode an image into the given output format.
///
/// `quality` applies to JPEG only; the other formats use their default
/// encoder settings.
pub fn encode_with_quality(
    img: &DynamicImage,
    format: ImageFormat,
    quality: u8,
) -> MediaResult<Vec<u8>> {
    let output = match format {
        ImageFormat::Jpeg => ImageOutputFormat::Jpeg(quality),
        ImageFormat::Png => ImageOutputFormat::Png,
        ImageFormat::Gif => ImageOutputFormat::Gif,
        ImageFormat::WebP => ImageOutputFormat::WebP,
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), output)
        .map_err(|e| MediaError::encode_failed(e.to_string()))?;
    Ok(buf)
}

/// Decode image bytes, verifying they form a valid image.
pub fn decode(bytes: &[u8]) -> MediaResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| MediaError::decode_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_landscape_into_landscape_box() {
        // 1000x800 into 800x600: height is the binding constraint
        assert_eq!(fit_dimensions((1000, 800), (800, 600)), (750, 600));
    }

    #[test]
    fn test_fit_into_square_box() {
        assert_eq!(fit_dimensions((1000, 800), (150, 150)), (150, 120));
        assert_eq!(fit_dimensions((1000, 800), (400, 400)), (400, 320));
        assert_eq!(fit_dimensions((800, 1000), (400, 400)), (320, 400));
    }

    #[test]
    fn test_never_upscales() {
        assert_eq!(fit_dimensions((100, 80), (800, 600)), (100, 80));
        assert_eq!(fit_dimensions((150, 150), (150, 150)), (150, 150));
    }

    #[test]
    fn test_extreme_aspect_ratios() {
        assert_eq!(fit_dimensions((3000, 10), (150, 150)), (150, 1));
        assert_eq!(fit_dimensions((10, 3000), (150, 150)), (1, 150));
    }

    #[test]
    fn test_zero_dimension_passthrough() {
        assert_eq!(fit_dimensions((0, 100), (150, 150)), (0, 100));
    }

    #[test]
    fn test_encode_decode_jpeg() {
        let img = DynamicImage::new_rgb8(32, 24);
        let bytes = encode(&img, ImageFormat::Jpeg).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (32, 24));
    }

    #[test]
    fn test_quality_affects_jpeg_size() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8])
        }));
        let low = encode_with_quality(&img, ImageFormat::Jpeg, 10).unwrap();
        let high = encode_with_quality(&img, ImageFormat::Jpeg, 95).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"not an image at all").is_err());
    }

    #[test]
    fn test_resize_to_fit_shrinks() {
        let img = DynamicImage::new_rgb8(1000, 800);
        let out = resize_to_fit(img, (800, 600));
        assert_eq!((out.width(), out.height()), (750, 600));
    }
}
