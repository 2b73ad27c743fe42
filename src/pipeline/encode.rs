//! Surface drawing and encoding shared by the image and PDF-raster paths.
//!
//! A decoded source is drawn onto a fresh RGBA surface of the requested
//! size. JPEG has no alpha channel, so for JPEG targets the surface is
//! pre-filled with opaque white and the source is alpha-composited over it;
//! otherwise transparent regions would come out black.

use crate::capabilities::ImageCodec;
use crate::error::ConvertError;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::debug;

const OPAQUE_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Whether `extension` names a JPEG-family format.
pub fn is_jpeg(extension: &str) -> bool {
    matches!(extension, "jpg" | "jpeg" | "jpe" | "jfif")
}

/// Draw `source` onto a `width`×`height` surface, white-filled for JPEG.
pub fn draw_surface(source: &RgbaImage, (width, height): (u32, u32), target: &str) -> RgbaImage {
    let scaled;
    let drawn = if source.dimensions() == (width, height) {
        source
    } else {
        scaled = imageops::resize(source, width, height, FilterType::Lanczos3);
        &scaled
    };

    if !is_jpeg(target) {
        return drawn.clone();
    }

    let mut surface = RgbaImage::from_pixel(width, height, OPAQUE_WHITE);
    imageops::overlay(&mut surface, drawn, 0, 0);
    surface
}

/// Encode a surface through the codec, turning an empty result into the
/// canonical encode failure.
pub async fn encode_surface(
    codec: &dyn ImageCodec,
    surface: RgbaImage,
    target: &str,
    quality: f32,
) -> Result<Vec<u8>, ConvertError> {
    let (w, h) = surface.dimensions();
    match codec.encode(surface, target, quality).await? {
        Some(bytes) if !bytes.is_empty() => {
            debug!("Encoded {w}x{h} surface → {} bytes {target}", bytes.len());
            Ok(bytes)
        }
        _ => Err(ConvertError::Encode("Failed to convert image to blob".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_family() {
        assert!(is_jpeg("jpg"));
        assert!(is_jpeg("jpeg"));
        assert!(!is_jpeg("png"));
    }

    #[test]
    fn jpeg_surface_replaces_transparency_with_white() {
        let transparent = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        let surface = draw_surface(&transparent, (2, 2), "jpg");
        assert!(surface.pixels().all(|p| *p == OPAQUE_WHITE));
    }

    #[test]
    fn png_surface_keeps_alpha() {
        let transparent = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        let surface = draw_surface(&transparent, (2, 2), "png");
        assert_eq!(surface.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn surface_is_resized() {
        let src = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        let surface = draw_surface(&src, (8, 4), "png");
        assert_eq!(surface.dimensions(), (8, 4));
    }
}
