//! [`ImageCodec`] backed by the `image` crate.

use super::blocking;
use crate::capabilities::ImageCodec;
use crate::error::ConvertError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Decodes anything `image` can sniff; encodes PNG, JPEG (with quality),
/// lossless WebP, GIF, BMP, TIFF and ICO.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

/// Map a 0.0–1.0 quality onto the JPEG encoder's 1–100 scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn encode_blocking(surface: RgbaImage, extension: &str, quality: f32) -> Result<Option<Vec<u8>>, ConvertError> {
    let Some(format) = ImageFormat::from_extension(extension) else {
        return Ok(None);
    };
    let mut buf = Cursor::new(Vec::new());
    let image = DynamicImage::ImageRgba8(surface);

    let written = if format == ImageFormat::Jpeg {
        let rgb = image.to_rgb8();
        JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality)).encode_image(&rgb)
    } else {
        image.write_to(&mut buf, format)
    };
    written.map_err(|e| ConvertError::Encode(format!("Failed to encode {extension}: {e}")))?;

    let bytes = buf.into_inner();
    debug!("image crate wrote {} bytes as {format:?}", bytes.len());
    Ok((!bytes.is_empty()).then_some(bytes))
}

#[async_trait]
impl ImageCodec for ImageCrateCodec {
    async fn decode(&self, bytes: Arc<[u8]>) -> Result<RgbaImage, ConvertError> {
        blocking("Image decode", move || {
            image::load_from_memory(&bytes)
                .map(|img| img.to_rgba8())
                .map_err(|e| ConvertError::Decode(e.to_string()))
        })
        .await
    }

    async fn encode(
        &self,
        surface: RgbaImage,
        extension: &str,
        quality: f32,
    ) -> Result<Option<Vec<u8>>, ConvertError> {
        let extension = extension.to_string();
        blocking("Image encode", move || encode_blocking(surface, &extension, quality)).await
    }
}
