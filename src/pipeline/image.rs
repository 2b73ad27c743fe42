//! Image pipeline: raster, SVG and HEIC sources.
//!
//! Raster sources run an ordered strategy chain ([`RASTER_CHAIN`]): the
//! canvas strategy (decode, draw, encode through the [`ImageCodec`]) and
//! then the ImageMagick fallback. The first success wins; if every strategy
//! fails their messages are folded into one diagnostic.
//!
//! SVG and HEIC sources bypass the chain. SVG is rasterised by the
//! [`crate::capabilities::SvgRasterizer`] and then drawn and encoded like
//! the canvas strategy; HEIC is delegated wholesale to the
//! [`crate::capabilities::HeicDecoder`].

use crate::capabilities::{Capabilities, MagickOutcome};
use crate::config::{ConversionOptions, DEFAULT_QUALITY};
use crate::error::ConvertError;
use crate::output::ConvertedFile;
use crate::pipeline::encode::{draw_surface, encode_surface};
use crate::pipeline::input::{replace_extension, SourceFile};
use crate::progress::{ProgressReporter, STAGE_CONVERTING, STAGE_FINALIZING, STAGE_LOADING};
use crate::registry::mime_for_extension;
use std::sync::Arc;
use tracing::{debug, info, warn};

const RASTER_TARGETS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff", "ico"];
const SVG_TARGETS: &[&str] = &["png", "jpg", "jpeg", "webp"];
const HEIC_TARGETS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Which path a (source, target) pair takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageRoute {
    Raster,
    Svg,
    Heic,
}

fn route(source: &str, target: &str) -> Option<ImageRoute> {
    let (route, targets) = match source {
        "svg" => (ImageRoute::Svg, SVG_TARGETS),
        "heic" | "heif" => (ImageRoute::Heic, HEIC_TARGETS),
        s if RASTER_TARGETS.contains(&s) => (ImageRoute::Raster, RASTER_TARGETS),
        _ => return None,
    };
    (targets.contains(&target) && source != target).then_some(route)
}

/// One named raster strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterStrategy {
    Canvas,
    Magick,
}

/// Raster strategies in the order they are tried.
pub const RASTER_CHAIN: [RasterStrategy; 2] = [RasterStrategy::Canvas, RasterStrategy::Magick];

impl RasterStrategy {
    fn label(&self, position: usize, short: bool) -> &'static str {
        match (self, short, position) {
            (RasterStrategy::Canvas, true, _) => "Canvas failed",
            (RasterStrategy::Canvas, false, _) => "Canvas conversion failed",
            (RasterStrategy::Magick, true, _) => "ImageMagick failed",
            (RasterStrategy::Magick, false, 0) => "ImageMagick conversion failed",
            (RasterStrategy::Magick, false, _) => "ImageMagick fallback also failed",
        }
    }
}

/// How a strategy failed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StrategyFailure {
    /// The strategy raised an error.
    Raised(String),
    /// The strategy completed and returned a failure outcome.
    Rejected(String),
}

impl StrategyFailure {
    fn message(&self) -> &str {
        match self {
            StrategyFailure::Raised(m) | StrategyFailure::Rejected(m) => m,
        }
    }
}

/// Fold accumulated failures into one message. The short wording is used
/// when the last strategy returned a failure outcome rather than raising.
fn exhausted_message(failures: &[(RasterStrategy, StrategyFailure)]) -> String {
    let short = matches!(failures.last(), Some((_, StrategyFailure::Rejected(_))));
    failures
        .iter()
        .enumerate()
        .map(|(i, (strategy, failure))| format!("{}: {}", strategy.label(i, short), failure.message()))
        .collect::<Vec<_>>()
        .join(". ")
}

/// Whether `caps` can attempt `source → target` without a missing collaborator.
pub fn check(caps: &Capabilities, source: &str, target: &str) -> Result<(), ConvertError> {
    match route(source, target).ok_or_else(|| ConvertError::unsupported(source, target))? {
        // Either strategy of the chain is enough.
        ImageRoute::Raster if caps.image_magick.is_some() => Ok(()),
        ImageRoute::Raster => caps.image_codec().map(|_| ()),
        ImageRoute::Svg => {
            caps.svg_rasterizer()?;
            caps.image_codec().map(|_| ())
        }
        ImageRoute::Heic => caps.heic_decoder().map(|_| ()),
    }
}

/// Image pipeline entry point.
pub async fn convert(
    caps: &Capabilities,
    source: &SourceFile,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<ConvertedFile, ConvertError> {
    let source_ext = source.extension();
    let chosen = route(&source_ext, target)
        .ok_or_else(|| ConvertError::unsupported(&source_ext, target))?;
    info!("Image conversion {} → {target} via {chosen:?}", source.name());

    progress.report(STAGE_LOADING, 0, format!("Loading {}", source.name()));
    let bytes = source.bytes().await?;

    let data = match chosen {
        ImageRoute::Raster => run_raster_chain(caps, bytes, &source_ext, target, options, progress).await?,
        ImageRoute::Svg => convert_svg(caps, bytes, target, options, progress).await?,
        ImageRoute::Heic => convert_heic(caps, bytes, target, options, progress).await?,
    };

    progress.complete(format!("Converted to {}", target.to_uppercase()));
    Ok(ConvertedFile::new(
        replace_extension(source.name(), target),
        mime_for_extension(target),
        data,
    ))
}

async fn run_raster_chain(
    caps: &Capabilities,
    bytes: Arc<[u8]>,
    source_ext: &str,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let mut failures = Vec::new();
    for strategy in RASTER_CHAIN {
        let attempt = match strategy {
            RasterStrategy::Canvas => canvas_strategy(caps, Arc::clone(&bytes), target, options, progress)
                .await
                .map_err(|e| StrategyFailure::Raised(e.to_string())),
            RasterStrategy::Magick => magick_strategy(caps, Arc::clone(&bytes), source_ext, target, progress).await,
        };
        match attempt {
            Ok(data) => {
                if !failures.is_empty() {
                    info!("{strategy:?} strategy succeeded after {} failure(s)", failures.len());
                }
                return Ok(data);
            }
            Err(failure) => {
                warn!("{strategy:?} strategy failed: {}", failure.message());
                failures.push((strategy, failure));
            }
        }
    }
    Err(ConvertError::FallbackExhausted(exhausted_message(&failures)))
}

async fn canvas_strategy(
    caps: &Capabilities,
    bytes: Arc<[u8]>,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let codec = caps.image_codec()?;
    let decoded = codec
        .decode(bytes)
        .await
        .map_err(|e| ConvertError::Decode(format!("Failed to load image file: {e}")))?;
    progress.report(STAGE_CONVERTING, 25, "Image decoded");

    let size = options.target_dimensions(decoded.dimensions());
    let surface = draw_surface(&decoded, size, target);
    debug!("Canvas surface {}x{}", size.0, size.1);
    progress.report(STAGE_FINALIZING, 50, "Encoding image");

    let data = encode_surface(&**codec, surface, target, options.quality_or(DEFAULT_QUALITY)).await?;
    progress.report(STAGE_FINALIZING, 75, "Image encoded");
    Ok(data)
}

async fn magick_strategy(
    caps: &Capabilities,
    bytes: Arc<[u8]>,
    source_ext: &str,
    target: &str,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, StrategyFailure> {
    let magick = caps
        .image_magick()
        .map_err(|e| StrategyFailure::Raised(e.to_string()))?;
    progress.report(STAGE_CONVERTING, 50, "Trying ImageMagick fallback");
    match magick.convert(bytes, source_ext, target).await {
        Ok(MagickOutcome::Converted(data)) if !data.is_empty() => {
            progress.report(STAGE_FINALIZING, 75, "ImageMagick conversion finished");
            Ok(data)
        }
        Ok(MagickOutcome::Converted(_)) => Err(StrategyFailure::Rejected("empty output".into())),
        Ok(MagickOutcome::Rejected(reason)) => Err(StrategyFailure::Rejected(reason)),
        Err(e) => Err(StrategyFailure::Raised(e.to_string())),
    }
}

async fn convert_svg(
    caps: &Capabilities,
    bytes: Arc<[u8]>,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let rasterizer = caps.svg_rasterizer()?;
    let codec = caps.image_codec()?;
    let raster = rasterizer
        .rasterize(bytes)
        .await
        .map_err(|e| ConvertError::Decode(format!("Failed to load SVG image for conversion: {e}")))?;
    progress.report(STAGE_CONVERTING, 25, "SVG rasterised");

    let size = options.target_dimensions(raster.dimensions());
    let surface = draw_surface(&raster, size, target);
    progress.report(STAGE_FINALIZING, 50, "Encoding image");

    let data = encode_surface(&**codec, surface, target, options.quality_or(DEFAULT_QUALITY)).await?;
    progress.report(STAGE_FINALIZING, 75, "Image encoded");
    Ok(data)
}

async fn convert_heic(
    caps: &Capabilities,
    bytes: Arc<[u8]>,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let heic_failed = |detail: String| ConvertError::Collaborator(format!("HEIC conversion failed: {detail}"));

    let decoder = caps.heic_decoder().map_err(|e| heic_failed(e.to_string()))?;
    progress.report(STAGE_CONVERTING, 25, "Decoding HEIC container");
    let frames = decoder
        .decode(bytes, mime_for_extension(target), options.quality_or(DEFAULT_QUALITY))
        .await
        .map_err(|e| heic_failed(e.to_string()))?;
    if frames.len() > 1 {
        debug!("HEIC container holds {} images, using the first", frames.len());
    }
    let first = frames
        .into_iter()
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| heic_failed("decoder returned no image".into()))?;
    progress.report(STAGE_FINALIZING, 75, "HEIC decoded");
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes() {
        assert_eq!(route("png", "jpg"), Some(ImageRoute::Raster));
        assert_eq!(route("svg", "png"), Some(ImageRoute::Svg));
        assert_eq!(route("heif", "jpeg"), Some(ImageRoute::Heic));
        assert_eq!(route("svg", "gif"), None);
        assert_eq!(route("png", "png"), None);
        assert_eq!(route("png", "xyz"), None);
    }

    #[test]
    fn registry_targets_all_route() {
        for entry in crate::registry::families() {
            if entry.family != crate::registry::Family::Images {
                continue;
            }
            for (src, targets) in entry.conversions {
                for t in *targets {
                    assert!(route(src, t).is_some(), "{src} → {t}");
                }
            }
        }
    }

    #[test]
    fn exhausted_message_when_fallback_raises() {
        let msg = exhausted_message(&[
            (RasterStrategy::Canvas, StrategyFailure::Raised("bad header".into())),
            (RasterStrategy::Magick, StrategyFailure::Raised("not installed".into())),
        ]);
        assert_eq!(
            msg,
            "Canvas conversion failed: bad header. ImageMagick fallback also failed: not installed"
        );
    }

    #[test]
    fn exhausted_message_when_fallback_rejects() {
        let msg = exhausted_message(&[
            (RasterStrategy::Canvas, StrategyFailure::Raised("bad header".into())),
            (RasterStrategy::Magick, StrategyFailure::Rejected("no delegate".into())),
        ]);
        assert_eq!(msg, "Canvas failed: bad header. ImageMagick failed: no delegate");
    }
}
