//! Archive pipeline: ZIP, GZIP and TAR.

use crate::capabilities::{ArchiveCodec, ArchiveEntry, Capabilities};
use crate::config::ConversionOptions;
use crate::error::ConvertError;
use crate::output::ConvertedFile;
use crate::pipeline::input::{replace_extension, SourceFile};
use crate::progress::{ProgressReporter, STAGE_CONVERTING, STAGE_FINALIZING, STAGE_LOADING};
use crate::registry::mime_for_extension;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveRoute {
    ZipToGzip,
    ZipToTar,
    GzipToZip,
    TarToZip,
}

fn route(source: &str, target: &str) -> Option<ArchiveRoute> {
    match (source, target) {
        ("zip", "gz") => Some(ArchiveRoute::ZipToGzip),
        ("zip", "tar") => Some(ArchiveRoute::ZipToTar),
        ("gz", "zip") => Some(ArchiveRoute::GzipToZip),
        ("tar", "zip") => Some(ArchiveRoute::TarToZip),
        _ => None,
    }
}

/// Name of the single entry recovered from a gzip stream: the source name
/// without its `.gz` suffix, or `<name>_decompressed` when nothing remains.
pub fn inner_name(gz_name: &str) -> String {
    let lower = gz_name.to_ascii_lowercase();
    match lower.strip_suffix(".gz") {
        Some(_) if gz_name.len() > 3 => gz_name[..gz_name.len() - 3].to_string(),
        _ => format!("{gz_name}_decompressed"),
    }
}

fn tar_unavailable() -> ConvertError {
    ConvertError::Unavailable("TAR to ZIP conversion is temporarily unavailable".into())
}

/// Whether `caps` can attempt `source → target` without a missing collaborator.
pub fn check(caps: &Capabilities, source: &str, target: &str) -> Result<(), ConvertError> {
    let chosen = route(source, target).ok_or_else(|| ConvertError::unsupported(source, target))?;
    if chosen == ArchiveRoute::TarToZip {
        return Err(tar_unavailable());
    }
    caps.archive_codec().map(|_| ())
}

/// Archive pipeline entry point.
pub async fn convert(
    caps: &Capabilities,
    source: &SourceFile,
    target: &str,
    _options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<ConvertedFile, ConvertError> {
    let source_ext = source.extension();
    let chosen = route(&source_ext, target).ok_or_else(|| ConvertError::unsupported(&source_ext, target))?;
    if chosen == ArchiveRoute::TarToZip {
        return Err(tar_unavailable());
    }
    let codec = caps.archive_codec()?;
    info!("Archive conversion {} → {target} via {chosen:?}", source.name());

    progress.report(STAGE_LOADING, 10, format!("Loading {}", source.name()));
    let bytes = source.bytes().await?;

    let data = match chosen {
        ArchiveRoute::ZipToGzip => zip_to_gzip(&**codec, bytes, progress).await?,
        ArchiveRoute::ZipToTar => zip_to_tar(&**codec, bytes, progress).await?,
        ArchiveRoute::GzipToZip => gzip_to_zip(&**codec, bytes, source.name(), progress).await?,
        ArchiveRoute::TarToZip => return Err(tar_unavailable()),
    };

    progress.complete(format!("Converted to {}", target.to_uppercase()));
    Ok(ConvertedFile::new(
        replace_extension(source.name(), target),
        mime_for_extension(target),
        data,
    ))
}

async fn zip_to_gzip(
    codec: &dyn ArchiveCodec,
    bytes: Arc<[u8]>,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let entries = codec.read_zip(bytes).await?;
    progress.report(STAGE_CONVERTING, 40, format!("Read {} entries", entries.len()));

    let mut joined = String::new();
    for entry in entries.iter().filter(|e| !e.is_dir) {
        joined.push_str(&String::from_utf8_lossy(&entry.data));
    }
    debug!("Concatenated {} bytes of entry text", joined.len());

    let compressed = codec.gzip(joined.into_bytes()).await?;
    progress.report(STAGE_FINALIZING, 60, "Compressed");
    Ok(compressed)
}

async fn zip_to_tar(
    codec: &dyn ArchiveCodec,
    bytes: Arc<[u8]>,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let entries = codec.read_zip(bytes).await?;
    progress.report(STAGE_CONVERTING, 40, format!("Read {} entries", entries.len()));

    let mut builder = codec.tar_builder();
    let mut appended = 0usize;
    for entry in entries.iter().filter(|e| !e.is_dir) {
        builder.append(&entry.name, &entry.data)?;
        appended += 1;
    }
    debug!("Appended {appended} entries to tar");
    let tar = builder.finish()?;
    progress.report(STAGE_FINALIZING, 60, format!("Packed {appended} entries"));
    Ok(tar)
}

async fn gzip_to_zip(
    codec: &dyn ArchiveCodec,
    bytes: Arc<[u8]>,
    name: &str,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let data = codec.gunzip(bytes).await?;
    progress.report(STAGE_CONVERTING, 40, format!("Decompressed {} bytes", data.len()));
    let zip = codec.write_zip(vec![ArchiveEntry::file(inner_name(name), data)]).await?;
    progress.report(STAGE_FINALIZING, 60, "Packed ZIP");
    Ok(zip)
}
