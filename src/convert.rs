//! Conversion entry points: the family dispatcher.
//!
//! [`Converter::convert`] is total. Whatever happens inside a pipeline
//! (an error, a collaborator failure, a panic) comes back as a
//! [`ConversionResult::Failure`] carrying a message; it never returns
//! `Err` and never unwinds into the caller.
//!
//! ## Why one dispatcher over per-family entry points?
//!
//! Callers pick a target from [`crate::registry::supported_targets`] and
//! hand over whatever file the user dropped in. Keeping the family lookup,
//! the failure boundary and the final `Error` progress event in one place
//! means every pipeline can just `?` its way out.

use crate::capabilities::Capabilities;
use crate::config::ConversionOptions;
use crate::error::ConvertError;
use crate::output::ConversionResult;
use crate::pipeline::input::SourceFile;
use crate::pipeline::{archive, document, image, media, spreadsheet};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::registry::{family_of, normalize_extension, Family};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Routes conversion requests to the family pipelines.
///
/// Holds only the collaborator bundle, so it is cheap to clone and can
/// serve concurrent requests.
#[derive(Debug, Clone)]
pub struct Converter {
    caps: Capabilities,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(Capabilities::native())
    }
}

impl Converter {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Convert `source` to `target`, reporting progress to `sink`.
    ///
    /// An unknown source extension fails immediately with no progress
    /// events. Otherwise the sink sees a non-decreasing sequence ending in
    /// exactly one `Complete` (100) on success or one `Error` on failure.
    pub async fn convert(
        &self,
        source: &SourceFile,
        target: &str,
        options: &ConversionOptions,
        sink: &dyn ProgressSink,
    ) -> ConversionResult {
        let started = Instant::now();
        let target = normalize_extension(target);
        let source_ext = source.extension();

        let Some(family) = family_of(&source_ext) else {
            let err = ConvertError::UnsupportedFormat {
                extension: source_ext,
            };
            warn!("Rejected {}: {err}", source.name());
            return ConversionResult::failure(err.to_string(), source.name(), target);
        };

        info!("Starting conversion: {} → {target} ({family})", source.name());
        let progress = ProgressReporter::new(sink);
        let outcome = AssertUnwindSafe(self.dispatch(family, source, &target, options, &progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ConvertError::Collaborator(panic_message(panic))));

        match outcome {
            Ok(file) => {
                info!(
                    "Conversion complete: {} ({} bytes, {}ms)",
                    file.name,
                    file.size(),
                    started.elapsed().as_millis()
                );
                ConversionResult::success(file, source.name(), target)
            }
            Err(err) => {
                let message = err.to_string();
                if !progress.is_terminated() {
                    progress.error(message.clone());
                }
                warn!("Conversion of {} to {target} failed: {message}", source.name());
                ConversionResult::failure(message, source.name(), target)
            }
        }
    }

    async fn dispatch(
        &self,
        family: Family,
        source: &SourceFile,
        target: &str,
        options: &ConversionOptions,
        progress: &ProgressReporter<'_>,
    ) -> Result<crate::output::ConvertedFile, ConvertError> {
        debug!("Dispatching {} to the {family} pipeline", source.name());
        let caps = &self.caps;
        match family {
            Family::Images => image::convert(caps, source, target, options, progress).await,
            Family::Documents => document::convert(caps, source, target, options, progress).await,
            Family::Audio | Family::Video => media::convert(caps, source, target, options, progress).await,
            Family::Archives => archive::convert(caps, source, target, options, progress).await,
            Family::Spreadsheets => spreadsheet::convert(caps, source, target, options, progress).await,
        }
    }

    /// Check that `source_ext → target` is registered and that every
    /// collaborator its pipeline needs is configured, without reading any
    /// bytes. Returns the error a conversion would fail with up front.
    pub fn check(&self, source_ext: &str, target: &str) -> Result<(), ConvertError> {
        let source_ext = normalize_extension(source_ext);
        let target = normalize_extension(target);
        let family = family_of(&source_ext).ok_or_else(|| ConvertError::UnsupportedFormat {
            extension: source_ext.clone(),
        })?;
        let caps = &self.caps;
        match family {
            Family::Images => image::check(caps, &source_ext, &target),
            Family::Documents => document::check(caps, &source_ext, &target),
            Family::Audio | Family::Video => media::check(caps, &source_ext, &target),
            Family::Archives => archive::check(caps, &source_ext, &target),
            Family::Spreadsheets => spreadsheet::check(caps, &source_ext, &target),
        }
    }

    /// Convert and write a successful result to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    /// Conversion failures come back as `Ok(Failure)`; only writing the
    /// output can produce `Err`.
    pub async fn convert_to_file(
        &self,
        source: &SourceFile,
        target: &str,
        output_path: impl AsRef<Path>,
        options: &ConversionOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ConversionResult, ConvertError> {
        let result = self.convert(source, target, options, sink).await;
        let Some(file) = result.file() else {
            return Ok(result);
        };
        let path = output_path.as_ref();
        let write_err = |e: std::io::Error| ConvertError::Io {
            path: path.display().to_string(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = path.with_extension(format!("{}.tmp", normalize_extension(target)));
        tokio::fs::write(&tmp_path, &file.data).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
        debug!("Wrote {} bytes to {}", file.size(), path.display());

        Ok(result)
    }

    /// Synchronous wrapper around [`Converter::convert`].
    ///
    /// Creates a temporary tokio runtime internally; must not be called
    /// from inside an async context.
    pub fn convert_sync(
        &self,
        source: &SourceFile,
        target: &str,
        options: &ConversionOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ConversionResult, ConvertError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {e}")))?;
        Ok(runtime.block_on(self.convert(source, target, options, sink)))
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown error".to_string()
    }
}
