//! Image normalization: shrink an upload until it fits the vision API's byte budget.
//!
//! Images that already fit and are in a format the API accepts are passed through
//! untouched. Everything else is flattened to RGB and re-encoded as JPEG, first by
//! stepping quality down, then by downscaling with Lanczos resampling.

use crate::error::{ExtractorError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::{debug, warn};

/// Default budget: 4.8 MiB, just under the API's 5 MB image limit.
pub const DEFAULT_MAX_IMAGE_MB: f64 = 4.8;

/// Convert a megabyte budget into bytes (truncated).
pub fn mb_to_bytes(mb: f64) -> usize {
    (mb * 1024.0 * 1024.0) as usize
}

/// Image media types accepted by the vision APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
    #[serde(rename = "image/webp")]
    Webp,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// Map a sniffed format onto an API media type, if the API takes it as-is.
    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::WebP => Some(Self::Webp),
            _ => None,
        }
    }
}

/// Knobs for the compression loop.
#[derive(Debug, Clone)]
pub struct CompressionSettings {
    pub max_bytes: usize,
    pub start_quality: u8,
    pub quality_step: u8,
    pub quality_floor: u8,
    /// Quality to restart from after each downscale.
    pub resize_quality: u8,
    /// Once both sides are below this, encode once more and stop.
    pub min_dimension: u32,
    pub final_quality: u8,
    /// Quality for the last-resort encode when the main loop fails.
    pub rescue_quality: u8,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self::with_max_bytes(mb_to_bytes(DEFAULT_MAX_IMAGE_MB))
    }
}

impl CompressionSettings {
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            start_quality: 95,
            quality_step: 5,
            quality_floor: 30,
            resize_quality: 80,
            min_dimension: 800,
            final_quality: 30,
            rescue_quality: 20,
        }
    }
}

/// An image ready to be sent to a vision API.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub data: Vec<u8>,
    pub media_type: MediaType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// False when the original bytes were passed through.
    pub transcoded: bool,
}

/// Format and dimensions of an image, read from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProbe {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Sniff format and dimensions without decoding pixel data.
pub fn probe(data: &[u8]) -> Result<ImageProbe> {
    let reader = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ExtractorError::Decode(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| ExtractorError::Decode("unrecognized image format".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ExtractorError::Decode(e.to_string()))?;

    Ok(ImageProbe {
        format,
        width,
        height,
    })
}

/// Compress with default settings and the given byte budget.
pub fn compress_image(data: &[u8], max_bytes: usize) -> Result<PreparedImage> {
    prepare_image(data, &CompressionSettings::with_max_bytes(max_bytes))
}

/// Normalize an image so it fits `settings.max_bytes`.
pub fn prepare_image(data: &[u8], settings: &CompressionSettings) -> Result<PreparedImage> {
    if data.len() <= settings.max_bytes {
        if let Ok(probe) = probe(data) {
            if let Some(media_type) = MediaType::from_format(probe.format) {
                debug!(
                    "Image within budget ({} <= {} bytes), passing through as {}",
                    data.len(),
                    settings.max_bytes,
                    media_type.as_str()
                );
                return Ok(PreparedImage {
                    data: data.to_vec(),
                    media_type,
                    width: Some(probe.width),
                    height: Some(probe.height),
                    transcoded: false,
                });
            }
        }
    }

    match shrink_to_budget(data, settings) {
        Ok(prepared) => Ok(prepared),
        Err(e) => {
            warn!("Compression loop failed ({}), trying rescue encode", e);
            rescue_encode(data, settings.rescue_quality)
        }
    }
}

fn shrink_to_budget(data: &[u8], settings: &CompressionSettings) -> Result<PreparedImage> {
    let decoded =
        image::load_from_memory(data).map_err(|e| ExtractorError::Decode(e.to_string()))?;
    let mut img = flatten_to_rgb(&decoded);
    let mut quality = settings.start_quality;

    loop {
        let encoded = encode_jpeg(&img, quality)?;
        let out_size = encoded.len();

        if out_size <= settings.max_bytes {
            debug!(
                "Compressed to {} bytes at quality {} ({}x{})",
                out_size,
                quality,
                img.width(),
                img.height()
            );
            return Ok(jpeg_result(encoded, &img));
        }

        if quality > settings.quality_floor {
            quality = quality.saturating_sub(settings.quality_step);
        } else {
            let ratio = (settings.max_bytes as f64 / out_size as f64).sqrt();
            let width = scale_dimension(img.width(), ratio);
            let height = scale_dimension(img.height(), ratio);
            debug!(
                "Downscaling {}x{} -> {}x{} ({} bytes over budget at quality {})",
                img.width(),
                img.height(),
                width,
                height,
                out_size - settings.max_bytes,
                quality
            );
            img = image::imageops::resize(&img, width, height, FilterType::Lanczos3);
            quality = settings.resize_quality;
        }

        if img.width() < settings.min_dimension && img.height() < settings.min_dimension {
            let encoded = encode_jpeg(&img, settings.final_quality)?;
            if encoded.len() > settings.max_bytes {
                warn!(
                    "Final encode still over budget: {} > {} bytes ({}x{})",
                    encoded.len(),
                    settings.max_bytes,
                    img.width(),
                    img.height()
                );
            }
            return Ok(jpeg_result(encoded, &img));
        }
    }
}

fn rescue_encode(data: &[u8], quality: u8) -> Result<PreparedImage> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| ExtractorError::Compression(e.to_string()))?;
    let img = decoded.to_rgb8();
    let encoded =
        encode_jpeg(&img, quality).map_err(|e| ExtractorError::Compression(e.to_string()))?;
    Ok(jpeg_result(encoded, &img))
}

fn jpeg_result(data: Vec<u8>, img: &RgbImage) -> PreparedImage {
    PreparedImage {
        data,
        media_type: MediaType::Jpeg,
        width: Some(img.width()),
        height: Some(img.height()),
        transcoded: true,
    }
}

/// Scale a side by `ratio`, truncating, never below one pixel.
fn scale_dimension(side: u32, ratio: f64) -> u32 {
    ((side as f64 * ratio) as u32).max(1)
}

/// Composite any alpha onto opaque white and drop the alpha channel.
fn flatten_to_rgb(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let blend = |c: u8| -> u8 {
            let a = a as u32;
            ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8
        };
        out.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .map_err(|e| ExtractorError::Compression(e.to_string()))?;
    Ok(buf)
}
