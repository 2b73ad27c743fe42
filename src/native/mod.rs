//! Native collaborator implementations wired by [`crate::Capabilities::native`].
//!
//! Pure-Rust codecs run inside `spawn_blocking`; the FFmpeg and ImageMagick
//! wrappers drive their executables through `tokio::process` in a private
//! temporary directory.

mod archive;
mod docx;
mod ffmpeg;
mod image_codec;
mod magick;
mod pdf;
mod spreadsheet;
#[cfg(feature = "svg")]
mod svg;

pub use archive::NativeArchiveCodec;
pub use docx::{DocxMarkup, DocxWriter};
pub use ffmpeg::FfmpegTranscoder;
pub use image_codec::ImageCrateCodec;
pub use magick::MagickCli;
pub use pdf::PdfiumEngine;
pub use spreadsheet::CalamineCodec;
#[cfg(feature = "svg")]
pub use svg::ResvgRasterizer;

use crate::error::ConvertError;

/// Run CPU-bound work on the blocking pool, mapping a join failure
/// (the closure panicked) into an internal error.
pub(crate) async fn blocking<T, F>(label: &'static str, f: F) -> Result<T, ConvertError>
where
    F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConvertError::Internal(format!("{label} task panicked: {e}")))?
}
