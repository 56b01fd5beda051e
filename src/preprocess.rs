use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

use crate::error::PipelineError;
use crate::settings::Settings;

pub const JPEG_MIME: &str = "image/jpeg";

const QUALITY_STEP: u8 = 15;
const MIN_QUALITY: u8 = 40;

/// Canonical payload sent to the OCR service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Content digest used as the image half of a submission key.
    pub fn key(&self) -> String {
        format!("{:x}", md5::compute(&self.bytes))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub max_payload_bytes: usize,
}

impl From<&Settings> for PreprocessOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_dimension: settings.max_dimension,
            jpeg_quality: settings.jpeg_quality,
            max_payload_bytes: settings.max_payload_bytes,
        }
    }
}

pub fn preprocess(bytes: &[u8], options: PreprocessOptions) -> Result<EncodedImage, PipelineError> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| PipelineError::UnreadableImage(err.to_string()))?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::UnreadableImage(
            "image has no pixels".to_string(),
        ));
    }
    let (target_w, target_h) = fit_within(width, height, options.max_dimension);
    let resized = if (target_w, target_h) == (width, height) {
        image
    } else {
        debug!(
            "resizing image {}x{} -> {}x{}",
            width, height, target_w, target_h
        );
        image.resize_exact(target_w, target_h, FilterType::Triangle)
    };
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut quality = options.jpeg_quality.clamp(1, 100);
    loop {
        let encoded = encode_jpeg(&rgb, quality)?;
        if encoded.len() <= options.max_payload_bytes {
            return Ok(EncodedImage {
                bytes: encoded,
                mime: JPEG_MIME,
                width: target_w,
                height: target_h,
            });
        }
        if quality <= MIN_QUALITY {
            return Err(PipelineError::PayloadTooLarge {
                size: encoded.len(),
                max: options.max_payload_bytes,
            });
        }
        debug!(
            "encoded image is {} bytes at quality {}; lowering quality",
            encoded.len(),
            quality
        );
        quality = quality.saturating_sub(QUALITY_STEP).max(MIN_QUALITY);
    }
}

/// Scales `(width, height)` so the longest edge is at most `max_dimension`.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return (width, height);
    }
    if width > height {
        let scaled = (height as f64 * max_dimension as f64 / width as f64).round() as u32;
        (max_dimension, scaled.max(1))
    } else {
        let scaled = (width as f64 * max_dimension as f64 / height as f64).round() as u32;
        (scaled.max(1), max_dimension)
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|err| PipelineError::UnreadableImage(format!("failed to encode JPEG: {}", err)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 255) as u8, (y % 255) as u8, 128, 255])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    fn options() -> PreprocessOptions {
        PreprocessOptions::from(&Settings::default())
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(4000, 3000, 1024), (1024, 768));
        assert_eq!(fit_within(1000, 3000, 1024), (341, 1024));
        assert_eq!(fit_within(800, 600, 1024), (800, 600));
        assert_eq!(fit_within(2048, 2048, 1024), (1024, 1024));
    }

    #[test]
    fn large_images_are_downscaled_to_jpeg() {
        let encoded = preprocess(&png_bytes(2048, 1024), options()).expect("preprocess");
        assert_eq!((encoded.width, encoded.height), (1024, 512));
        assert_eq!(encoded.mime, JPEG_MIME);
        let decoded = image::load_from_memory(&encoded.bytes).expect("decode jpeg");
        assert_eq!(decoded.dimensions(), (1024, 512));
        assert!(!encoded.base64().is_empty());
    }

    #[test]
    fn small_images_keep_their_size() {
        let encoded = preprocess(&png_bytes(300, 100), options()).expect("preprocess");
        assert_eq!((encoded.width, encoded.height), (300, 100));
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let err = preprocess(b"definitely not an image", options()).unwrap_err();
        assert!(matches!(err, PipelineError::UnreadableImage(_)));
    }

    #[test]
    fn payload_cap_is_enforced() {
        let mut options = options();
        options.max_payload_bytes = 16;
        let err = preprocess(&png_bytes(64, 64), options).unwrap_err();
        assert!(matches!(err, PipelineError::PayloadTooLarge { max: 16, .. }));
    }

    #[test]
    fn key_is_stable_for_identical_payloads() {
        let first = preprocess(&png_bytes(32, 32), options()).expect("preprocess");
        let second = preprocess(&png_bytes(32, 32), options()).expect("preprocess");
        assert_eq!(first.key(), second.key());
        assert_eq!(first.key().len(), 32);
    }
}
