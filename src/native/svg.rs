//! [`SvgRasterizer`] backed by resvg.

use super::blocking;
use crate::capabilities::SvgRasterizer;
use crate::error::ConvertError;
use async_trait::async_trait;
use image::RgbaImage;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};
use std::sync::Arc;

/// Renders SVG at its intrinsic size.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResvgRasterizer;

fn rasterize_blocking(svg: &[u8]) -> Result<RgbaImage, ConvertError> {
    let tree = Tree::from_data(svg, &Options::default())
        .map_err(|e| ConvertError::Decode(format!("Failed to parse SVG: {e}")))?;

    let size = tree.size();
    let width = size.width().ceil() as u32;
    let height = size.height().ceil() as u32;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| ConvertError::Decode(format!("Invalid SVG size {width}x{height}")))?;

    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha; image expects straight alpha.
    let straight: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();

    RgbaImage::from_raw(width, height, straight)
        .ok_or_else(|| ConvertError::Decode("Failed to create image from pixmap".into()))
}

#[async_trait]
impl SvgRasterizer for ResvgRasterizer {
    async fn rasterize(&self, svg: Arc<[u8]>) -> Result<RgbaImage, ConvertError> {
        blocking("SVG render", move || rasterize_blocking(&svg)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_intrinsic_size() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10">
            <rect width="20" height="10" fill="#00ff00"/></svg>"##;
        let img = ResvgRasterizer.rasterize(Arc::from(&svg[..])).await.unwrap();
        assert_eq!(img.dimensions(), (20, 10));
        assert_eq!(img.get_pixel(5, 5).0, [0, 255, 0, 255]);
    }

    #[tokio::test]
    async fn translucent_fill_keeps_its_colour() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4">
            <rect width="4" height="4" fill="#ff0000" fill-opacity="0.5"/></svg>"##;
        let img = ResvgRasterizer.rasterize(Arc::from(&svg[..])).await.unwrap();
        let [r, g, b, a] = img.get_pixel(1, 1).0;
        assert_eq!((r, g, b), (255, 0, 0));
        assert!((127..=128).contains(&a), "alpha {a}");
    }

    #[tokio::test]
    async fn rejects_non_svg() {
        let err = ResvgRasterizer.rasterize(Arc::from(&b"<html>"[..])).await;
        assert!(err.is_err());
    }
}
