//! crates/doc_library_core/src/compress.rs
//!
//! Best-effort recompression of subject images before they are stored inline.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, GenericImageView, RgbImage};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::tiering::decode_data_url;

const JPEG_DATA_PREFIX: &str = "data:image/jpeg;base64,";
const START_QUALITY: u8 = 90;
const MIN_QUALITY: u8 = 10;
const QUALITY_STEP: u8 = 10;

/// Scales `(width, height)` so the longer side is at most `max_dimension`,
/// keeping the aspect ratio. Smaller images are left as they are.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let (w, h, max) = (width as u64, height as u64, max_dimension as u64);
    if w > h && w > max {
        (max_dimension, ((h * max) / w).max(1) as u32)
    } else if h > max {
        (((w * max) / h).max(1) as u32, max_dimension)
    } else {
        (width, height)
    }
}

/// Re-encodes an inline image payload as JPEG, lowering the quality in steps
/// of 10 (starting at 90) until the resulting payload is at most `max_bytes`
/// long. The quality-10 result is returned even when it is still too large.
pub fn compress_image(payload: &str, max_bytes: usize, max_dimension: u32) -> CoreResult<String> {
    let image = load_scaled(payload, max_dimension)?;

    let mut quality = START_QUALITY;
    let mut encoded = encode_jpeg(&image, quality)?;
    while encoded.len() > max_bytes && quality > MIN_QUALITY {
        quality -= QUALITY_STEP;
        encoded = encode_jpeg(&image, quality)?;
    }

    debug!(
        width = image.width(),
        height = image.height(),
        quality,
        bytes = encoded.len(),
        "Recompressed image"
    );
    Ok(encoded)
}

fn load_scaled(payload: &str, max_dimension: u32) -> CoreResult<RgbImage> {
    let decoded = decode_data_url(payload).map_err(|e| CoreError::ImageDecode(e.to_string()))?;
    let image = image::load_from_memory(&decoded.bytes)
        .map_err(|e| CoreError::ImageDecode(e.to_string()))?;

    let (width, height) = image.dimensions();
    let (target_w, target_h) = fit_within(width, height, max_dimension);
    let image = if (target_w, target_h) == (width, height) {
        image
    } else {
        image.resize_exact(target_w, target_h, FilterType::Triangle)
    };
    // JPEG has no alpha channel.
    Ok(image.to_rgb8())
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> CoreResult<String> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .encode_image(image)
        .map_err(|e| CoreError::ImageDecode(format!("re-encoding failed: {}", e)))?;
    Ok(format!("{}{}", JPEG_DATA_PREFIX, STANDARD.encode(&buffer)))
}
