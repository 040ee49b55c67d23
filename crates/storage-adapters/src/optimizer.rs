//! # Image optimizer
//!
//! Decodes any supported raster format, drops alpha, bounds the longer side
//! to [`MAX_DIMENSION`] and re-encodes as JPEG. Runs on the blocking pool.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use domains::ImageOptimizer;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, ImageReader};
use tracing::debug;

pub const MAX_DIMENSION: u32 = 2048;
pub const JPEG_QUALITY: u8 = 82;

#[derive(Debug, Clone, Copy, Default)]
pub struct JpegOptimizer;

#[async_trait]
impl ImageOptimizer for JpegOptimizer {
    async fn optimize(&self, raw: Bytes) -> anyhow::Result<Bytes> {
        let encoded = tokio::task::spawn_blocking(move || optimize_image(&raw)).await??;
        Ok(Bytes::from(encoded))
    }
}

pub fn optimize_image(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()?
        .decode()?;

    let (width, height) = img.dimensions();
    let img = if width.max(height) > MAX_DIMENSION {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;
    debug!(
        from = raw.len(),
        to = out.len(),
        width = rgb.width(),
        height = rgb.height(),
        "image optimized"
    );
    Ok(out)
}
