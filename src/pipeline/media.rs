//! Audio and video pipeline over a [`Transcoder`] session.
//!
//! Both families share one path: load the engine, write `input.<src>` into
//! its filesystem, run `-i input.<src> <flags> output.<tgt>`, read the
//! output back and unlink both files. The engine is terminated afterwards
//! whatever happened, so every call is its own session.
//!
//! ## Why a session lock
//!
//! The engine's file names are fixed. Two overlapping conversions against
//! the same transcoder would overwrite each other's input, so sessions are
//! serialised on [`SESSION`] for the whole load → terminate span.

use crate::capabilities::{Capabilities, Transcoder};
use crate::config::ConversionOptions;
use crate::error::ConvertError;
use crate::output::ConvertedFile;
use crate::pipeline::input::{replace_extension, SourceFile};
use crate::progress::{interpolate, ProgressReporter, STAGE_CONVERTING, STAGE_FINALIZING, STAGE_LOADING};
use crate::registry::{family_of, is_supported, Family};
use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const EXEC_PROGRESS_START: u8 = 30;
const EXEC_PROGRESS_END: u8 = 70;

const AUDIO_FALLBACK_MIME: &str = "audio/mpeg";
const VIDEO_FALLBACK_MIME: &str = "video/mp4";

const MEDIA_MIME: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("aac", "audio/aac"),
    ("m4a", "audio/mp4"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
];

static SESSION: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    fn label(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

fn route(source: &str, target: &str) -> Option<MediaKind> {
    let kind = match family_of(source)? {
        Family::Audio => MediaKind::Audio,
        Family::Video => MediaKind::Video,
        _ => return None,
    };
    is_supported(source, target).then_some(kind)
}

/// MIME type for a media output, falling back per kind.
pub fn media_mime(target: &str, kind: MediaKind) -> &'static str {
    MEDIA_MIME
        .iter()
        .find(|(ext, _)| *ext == target)
        .map(|(_, mime)| *mime)
        .unwrap_or(match kind {
            MediaKind::Audio => AUDIO_FALLBACK_MIME,
            MediaKind::Video => VIDEO_FALLBACK_MIME,
        })
}

/// Transcoder arguments for one conversion.
pub fn build_args(kind: MediaKind, source: &str, target: &str, options: &ConversionOptions) -> Vec<String> {
    let mut args = vec!["-i".to_string(), format!("input.{source}")];
    match kind {
        MediaKind::Video => {
            args.extend([
                "-c:v".to_string(),
                options.video_codec().to_string(),
                "-preset".to_string(),
                options.preset().to_string(),
                "-crf".to_string(),
                options.crf().to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
            ]);
        }
        MediaKind::Audio => {
            if let Some(kbps) = options.bitrate {
                args.extend(["-b:a".to_string(), format!("{kbps}k")]);
            }
        }
    }
    args.push(format!("output.{target}"));
    args
}

/// Whether `caps` can attempt `source → target` without a missing collaborator.
pub fn check(caps: &Capabilities, source: &str, target: &str) -> Result<(), ConvertError> {
    route(source, target).ok_or_else(|| ConvertError::unsupported(source, target))?;
    caps.transcoder().map(|_| ())
}

/// Media pipeline entry point.
pub async fn convert(
    caps: &Capabilities,
    source: &SourceFile,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<ConvertedFile, ConvertError> {
    let source_ext = source.extension();
    let kind = route(&source_ext, target).ok_or_else(|| ConvertError::unsupported(&source_ext, target))?;
    let transcoder = caps.transcoder()?;
    info!("Media conversion {} → {target} ({})", source.name(), kind.label());

    progress.report(STAGE_LOADING, 0, format!("Loading {}", source.name()));
    let bytes = source.bytes().await?;

    let _session = SESSION.lock().await;
    let outcome = run_session(&**transcoder, &bytes, &source_ext, target, kind, options, progress).await;
    transcoder.terminate().await;
    debug!("Transcoder session terminated");
    let data = outcome?;

    progress.complete(format!("Converted to {}", target.to_uppercase()));
    Ok(ConvertedFile::new(
        replace_extension(source.name(), target),
        media_mime(target, kind),
        data,
    ))
}

async fn run_session(
    transcoder: &dyn Transcoder,
    bytes: &[u8],
    source_ext: &str,
    target: &str,
    kind: MediaKind,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    if !transcoder.is_loaded() {
        progress.report(STAGE_LOADING, 10, "Loading FFmpeg");
        transcoder.load().await.map_err(|e| match e {
            ConvertError::CollaboratorLoad { .. } => e,
            other => ConvertError::CollaboratorLoad {
                stage: "FFmpeg",
                detail: other.to_string(),
            },
        })?;
    }

    let input = format!("input.{source_ext}");
    let output = format!("output.{target}");
    progress.report(STAGE_LOADING, 20, format!("Writing {input}"));
    transcoder.write_file(&input, bytes).await?;

    let args = build_args(kind, source_ext, target, options);
    debug!("Transcoder args: {}", args.join(" "));
    progress.report(STAGE_CONVERTING, EXEC_PROGRESS_START, format!("Converting {}", kind.label()));
    let listener = progress.clone();
    let on_ratio = move |ratio: f64| {
        listener.report(
            STAGE_CONVERTING,
            interpolate(EXEC_PROGRESS_START, EXEC_PROGRESS_END, ratio),
            format!("Converting {}%", (ratio.clamp(0.0, 1.0) * 100.0).round()),
        );
    };
    transcoder.exec(&args, &on_ratio).await?;

    progress.report(STAGE_FINALIZING, 80, format!("Reading {output}"));
    let data = transcoder.read_file(&output).await?;

    for name in [&input, &output] {
        if let Err(e) = transcoder.delete_file(name).await {
            warn!("Failed to delete {name} from transcoder: {e}");
        }
    }
    Ok(data)
}
