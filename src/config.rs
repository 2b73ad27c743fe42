//! Per-call conversion options.
//!
//! [`ConversionOptions`] carries only what the caller asked for: every field
//! is optional, and each pipeline stage applies its own default through the
//! accessor methods (`quality_or`, `scale_or`, ...). This is why the same
//! `quality` field means "JPEG quality, default 0.8" in the image pipeline
//! and "rasterisation scale, default 1.5" in the spreadsheet pipeline.
//!
//! Build options with [`ConversionOptions::builder()`]:
//!
//! ```rust
//! use fileshift::ConversionOptions;
//!
//! let options = ConversionOptions::builder()
//!     .quality(0.9)
//!     .width(640)
//!     .build()
//!     .unwrap();
//! assert_eq!(options.quality, Some(0.9));
//! ```

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};

/// Default encode quality for lossy image and audio targets.
pub const DEFAULT_QUALITY: f32 = 0.8;
/// Default encode quality when rasterising PDF pages.
pub const DEFAULT_PDF_IMAGE_QUALITY: f32 = 0.92;
/// Default PDF rasterisation multiplier.
pub const DEFAULT_SCALE: f32 = 1.5;
/// Upper bound for `scale`.
pub const MAX_SCALE: f32 = 5.0;
/// Default spreadsheet rasterisation multiplier (read from `quality`).
pub const DEFAULT_SHEET_SCALE: f32 = 1.5;

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_PRESET: &str = "veryfast";
pub const DEFAULT_CRF: u8 = 23;

/// Options recognised by the conversion pipelines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Encode fidelity for lossy targets, 0.0–1.0.
    pub quality: Option<f32>,
    /// Target raster width in pixels.
    pub width: Option<u32>,
    /// Target raster height in pixels.
    pub height: Option<u32>,
    /// PDF rasterisation multiplier, 0 < scale ≤ 5.
    pub scale: Option<f32>,
    /// Media encode bitrate in kbps.
    pub bitrate: Option<u32>,
    /// 1-based PDF page rasterised for PDF → image. Default: 1.
    pub page: Option<usize>,
    /// Video codec override. Default: `libx264`.
    pub video_codec: Option<String>,
    /// Encoder preset override. Default: `veryfast`.
    pub preset: Option<String>,
    /// Constant rate factor override, 0–51. Default: 23.
    pub crf: Option<u8>,
}

impl ConversionOptions {
    pub fn builder() -> ConversionOptionsBuilder {
        ConversionOptionsBuilder {
            options: Self::default(),
        }
    }

    pub fn quality_or(&self, default: f32) -> f32 {
        self.quality.unwrap_or(default)
    }

    pub fn scale_or(&self, default: f32) -> f32 {
        self.scale
            .filter(|s| *s > 0.0 && *s <= MAX_SCALE)
            .unwrap_or(default)
    }

    pub fn page_or_first(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn video_codec(&self) -> &str {
        self.video_codec.as_deref().unwrap_or(DEFAULT_VIDEO_CODEC)
    }

    pub fn preset(&self) -> &str {
        self.preset.as_deref().unwrap_or(DEFAULT_PRESET)
    }

    pub fn crf(&self) -> u8 {
        self.crf.unwrap_or(DEFAULT_CRF)
    }

    /// Resolve the output raster size for a source of `natural` dimensions.
    ///
    /// With both `width` and `height` set the surface is exactly that size.
    /// With only one set, the other follows the source aspect ratio.
    pub fn target_dimensions(&self, natural: (u32, u32)) -> (u32, u32) {
        let (nw, nh) = natural;
        match (self.width, self.height) {
            (Some(w), Some(h)) => (w.max(1), h.max(1)),
            (Some(w), None) if nw > 0 => {
                let h = (w as f64 * nh as f64 / nw as f64).round() as u32;
                (w.max(1), h.max(1))
            }
            (None, Some(h)) if nh > 0 => {
                let w = (h as f64 * nw as f64 / nh as f64).round() as u32;
                (w.max(1), h.max(1))
            }
            _ => (nw.max(1), nh.max(1)),
        }
    }
}

/// Builder for [`ConversionOptions`].
#[derive(Debug)]
pub struct ConversionOptionsBuilder {
    options: ConversionOptions,
}

impl ConversionOptionsBuilder {
    pub fn quality(mut self, q: f32) -> Self {
        self.options.quality = Some(q.clamp(0.0, 1.0));
        self
    }

    pub fn width(mut self, w: u32) -> Self {
        self.options.width = Some(w);
        self
    }

    pub fn height(mut self, h: u32) -> Self {
        self.options.height = Some(h);
        self
    }

    pub fn scale(mut self, s: f32) -> Self {
        self.options.scale = Some(s);
        self
    }

    pub fn bitrate(mut self, kbps: u32) -> Self {
        self.options.bitrate = Some(kbps);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.options.page = Some(page);
        self
    }

    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.options.video_codec = Some(codec.into());
        self
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.options.preset = Some(preset.into());
        self
    }

    pub fn crf(mut self, crf: u8) -> Self {
        self.options.crf = Some(crf);
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<ConversionOptions, ConvertError> {
        let o = &self.options;
        if let Some(s) = o.scale {
            if !(s > 0.0 && s <= MAX_SCALE) {
                return Err(ConvertError::InvalidOptions(format!(
                    "scale must be in (0, {MAX_SCALE}], got {s}"
                )));
            }
        }
        if let Some(crf) = o.crf {
            if crf > 51 {
                return Err(ConvertError::InvalidOptions(format!(
                    "crf must be 0–51, got {crf}"
                )));
            }
        }
        if o.width == Some(0) || o.height == Some(0) {
            return Err(ConvertError::InvalidOptions(
                "width and height must be ≥ 1".into(),
            ));
        }
        if o.page == Some(0) {
            return Err(ConvertError::InvalidOptions("page numbers start at 1".into()));
        }
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stage_specific() {
        let o = ConversionOptions::default();
        assert_eq!(o.quality_or(DEFAULT_QUALITY), 0.8);
        assert_eq!(o.quality_or(DEFAULT_PDF_IMAGE_QUALITY), 0.92);
        assert_eq!(o.scale_or(DEFAULT_SCALE), 1.5);
        assert_eq!(o.page_or_first(), 1);
        assert_eq!(o.video_codec(), "libx264");
        assert_eq!(o.preset(), "veryfast");
        assert_eq!(o.crf(), 23);
    }

    #[test]
    fn quality_is_clamped() {
        let o = ConversionOptions::builder().quality(3.0).build().unwrap();
        assert_eq!(o.quality, Some(1.0));
    }

    #[test]
    fn scale_out_of_range_is_rejected() {
        assert!(ConversionOptions::builder().scale(0.0).build().is_err());
        assert!(ConversionOptions::builder().scale(5.5).build().is_err());
        assert!(ConversionOptions::builder().scale(5.0).build().is_ok());
    }

    #[test]
    fn crf_and_zero_sizes_are_rejected() {
        assert!(ConversionOptions::builder().crf(52).build().is_err());
        assert!(ConversionOptions::builder().width(0).build().is_err());
        assert!(ConversionOptions::builder().page(0).build().is_err());
    }

    #[test]
    fn dimensions_preserve_aspect() {
        let natural = (400, 200);
        let only_w = ConversionOptions::builder().width(100).build().unwrap();
        assert_eq!(only_w.target_dimensions(natural), (100, 50));
        let only_h = ConversionOptions::builder().height(100).build().unwrap();
        assert_eq!(only_h.target_dimensions(natural), (200, 100));
        let both = ConversionOptions::builder().width(10).height(10).build().unwrap();
        assert_eq!(both.target_dimensions(natural), (10, 10));
        assert_eq!(ConversionOptions::default().target_dimensions(natural), natural);
    }

    #[test]
    fn options_deserialize_with_missing_fields() {
        let o: ConversionOptions = serde_json::from_str(r#"{"quality":0.5}"#).unwrap();
        assert_eq!(o.quality, Some(0.5));
        assert_eq!(o.width, None);
    }
}
