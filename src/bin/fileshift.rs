//! CLI binary for fileshift.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionOptions` and `Capabilities` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fileshift::native::{FfmpegTranscoder, MagickCli};
use fileshift::registry::{families, normalize_extension};
use fileshift::{
    family_of, supported_targets, Capabilities, ConversionOptions, ConversionProgress, ConversionResult,
    Converter, NoopProgress, ProgressSink, SourceFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: one 0–100 bar whose prefix tracks the stage.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(name: &str) -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:<10} [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.set_message(name.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressSink for CliProgress {
    fn on_progress(&self, p: &ConversionProgress) {
        self.bar.set_prefix(p.stage.clone());
        self.bar.set_position(p.progress as u64);
        self.bar.set_message(p.message.clone());
        match p.stage.as_str() {
            "Complete" => self.bar.finish_and_clear(),
            "Error" => self.bar.abandon_with_message(red(&p.message)),
            _ => {}
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # PNG to JPEG next to the source (photo.jpg)
  fileshift convert photo.png --to jpg

  # Resize while converting
  fileshift convert photo.png --to webp --width 800 -o thumbs/photo.webp

  # Third page of a PDF as PNG at 2x
  fileshift convert report.pdf --to png --page 3 --scale 2

  # Audio with an explicit bitrate
  fileshift convert song.wav --to mp3 --bitrate 192

  # Video with a custom encoder preset
  fileshift convert clip.mov --to mp4 --preset slow --crf 20

  # Machine-readable result
  fileshift convert data.xlsx --to csv --json

  # What can a file become?
  fileshift formats pdf

ENVIRONMENT VARIABLES:
  FILESHIFT_FFMPEG   Path to the ffmpeg executable (default: ffmpeg on PATH)
  FILESHIFT_MAGICK   Path to the ImageMagick executable (default: magick on PATH)
  PDFIUM_LIB_PATH    Path to a pdfium shared library (default: system library)
  RUST_LOG           Log filter, e.g. fileshift=debug
"#;

/// Convert files between image, document, media, archive and spreadsheet formats.
#[derive(Parser, Debug)]
#[command(
    name = "fileshift",
    version,
    about = "Convert files between image, document, media, archive and spreadsheet formats",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FILESHIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FILESHIFT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one file.
    Convert(ConvertArgs),
    /// List supported conversions, optionally for one source extension.
    Formats {
        /// Source extension, e.g. `pdf` or `.PNG`.
        extension: Option<String>,
        /// Output JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// File to convert.
    input: PathBuf,

    /// Target extension, e.g. jpg, pdf, mp3.
    #[arg(long, short = 't')]
    to: String,

    /// Output path. Default: the source name with the target extension,
    /// next to the source.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Encode quality for lossy targets (0.0–1.0). Spreadsheet → PDF uses it
    /// as the rasterisation scale.
    #[arg(long)]
    quality: Option<f32>,

    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// PDF rasterisation scale (0 < scale ≤ 5).
    #[arg(long)]
    scale: Option<f32>,

    /// Audio bitrate in kbps.
    #[arg(long)]
    bitrate: Option<u32>,

    /// PDF page to rasterise (1-based).
    #[arg(long)]
    page: Option<usize>,

    /// Video constant rate factor (0–51).
    #[arg(long)]
    crf: Option<u8>,

    /// Video encoder preset.
    #[arg(long)]
    preset: Option<String>,

    /// Video codec.
    #[arg(long)]
    video_codec: Option<String>,

    /// ffmpeg executable.
    #[arg(long, env = "FILESHIFT_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// ImageMagick executable.
    #[arg(long, env = "FILESHIFT_MAGICK")]
    magick: Option<PathBuf>,

    /// Print the ConversionResult as JSON.
    #[arg(long)]
    json: bool,

    /// With --json, embed the output bytes as a data URL.
    #[arg(long, requires = "json")]
    inline: bool,

    /// Disable progress bar.
    #[arg(long, env = "FILESHIFT_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Keep library INFO logs out of the way while the progress bar is live.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Formats { .. } => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Formats { extension, json } => {
            print_formats(&Converter::default(), extension.as_deref(), json)
        }
        Command::Convert(args) => run_convert(args, cli.quiet, show_progress).await,
    }
}

async fn run_convert(args: ConvertArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let started = Instant::now();
    let options = build_options(&args)?;
    let converter = Converter::new(build_capabilities(&args));
    let source = SourceFile::from_path(&args.input);
    let target = normalize_extension(&args.to);
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input, &target));

    let sink: Box<dyn ProgressSink> = if show_progress {
        Box::new(CliProgress::new(source.name()))
    } else {
        Box::new(NoopProgress)
    };

    let result = converter
        .convert_to_file(&source, &target, &output_path, &options, sink.as_ref())
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    if args.json {
        println!("{}", result_json(&result, args.inline)?);
    }

    match &result {
        ConversionResult::Success { file_size, .. } => {
            if !quiet && !args.json {
                eprintln!(
                    "{}  {} → {}  {}  {}",
                    green("✔"),
                    source.name(),
                    bold(&output_path.display().to_string()),
                    dim(&format!("{file_size} bytes")),
                    dim(&format!("{}ms", started.elapsed().as_millis())),
                );
            }
            Ok(())
        }
        ConversionResult::Failure { error, .. } => {
            anyhow::bail!("Conversion failed: {error}")
        }
    }
}

/// Map CLI args to `ConversionOptions`.
fn build_options(args: &ConvertArgs) -> Result<ConversionOptions> {
    let mut builder = ConversionOptions::builder();
    if let Some(q) = args.quality {
        builder = builder.quality(q);
    }
    if let Some(w) = args.width {
        builder = builder.width(w);
    }
    if let Some(h) = args.height {
        builder = builder.height(h);
    }
    if let Some(s) = args.scale {
        builder = builder.scale(s);
    }
    if let Some(b) = args.bitrate {
        builder = builder.bitrate(b);
    }
    if let Some(p) = args.page {
        builder = builder.page(p);
    }
    if let Some(c) = args.crf {
        builder = builder.crf(c);
    }
    if let Some(ref p) = args.preset {
        builder = builder.preset(p.clone());
    }
    if let Some(ref c) = args.video_codec {
        builder = builder.video_codec(c.clone());
    }
    builder.build().context("Invalid options")
}

/// Native capabilities with executable overrides applied.
fn build_capabilities(args: &ConvertArgs) -> Capabilities {
    let mut caps = Capabilities::native();
    if let Some(ref path) = args.ffmpeg {
        caps = caps.with_transcoder(Arc::new(FfmpegTranscoder::new(path)));
    }
    if let Some(ref path) = args.magick {
        caps = caps.with_image_magick(Arc::new(MagickCli::new(path)));
    }
    caps
}

fn default_output(input: &Path, target: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}.{target}"))
}

fn result_json(result: &ConversionResult, inline: bool) -> Result<String> {
    let mut value = serde_json::to_value(result).context("Failed to serialise result")?;
    if inline {
        if let (Some(file), Some(obj)) = (result.file(), value.get_mut("file").and_then(|f| f.as_object_mut())) {
            obj.insert("data_url".into(), serde_json::Value::String(file.data_url()));
        }
    }
    serde_json::to_string_pretty(&value).context("Failed to serialise result")
}

/// Targets of `source`, with the reason each unreachable one would fail.
fn availability(converter: &Converter, source: &str) -> Vec<(&'static str, Option<String>)> {
    supported_targets(source)
        .iter()
        .map(|target| (*target, converter.check(source, target).err().map(|e| e.to_string())))
        .collect()
}

/// Comma-separated targets; unreachable ones are dimmed and starred.
fn target_list(targets: &[(&str, Option<String>)]) -> String {
    targets
        .iter()
        .map(|(target, reason)| match reason {
            None => target.to_string(),
            Some(_) => dim(&format!("{target}*")),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn targets_json(targets: &[(&str, Option<String>)]) -> serde_json::Value {
    targets
        .iter()
        .map(|(target, reason)| {
            serde_json::json!({
                "target": target,
                "available": reason.is_none(),
                "reason": reason,
            })
        })
        .collect()
}

const UNAVAILABLE_NOTE: &str = "* registered, but a required collaborator is not configured";

fn print_formats(converter: &Converter, extension: Option<&str>, json: bool) -> Result<()> {
    if let Some(ext) = extension {
        let ext = normalize_extension(ext);
        if supported_targets(&ext).is_empty() {
            anyhow::bail!("Unsupported file format: {ext}");
        }
        let targets = availability(converter, &ext);
        if json {
            let value = serde_json::json!({
                "source": ext,
                "family": family_of(&ext),
                "targets": targets_json(&targets),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            let family = family_of(&ext).map(|f| f.label()).unwrap_or_default();
            println!("{} {}  →  {}", bold(&ext), dim(&format!("({family})")), target_list(&targets));
            for (target, reason) in targets.iter().filter_map(|(t, r)| r.as_ref().map(|r| (t, r))) {
                println!("  {}", dim(&format!("{target}: {reason}")));
            }
        }
        return Ok(());
    }

    if json {
        let mut map = serde_json::Map::new();
        for entry in families() {
            let conversions: serde_json::Map<String, serde_json::Value> = entry
                .conversions
                .iter()
                .map(|(src, _)| (src.to_string(), targets_json(&availability(converter, src))))
                .collect();
            map.insert(entry.family.label().to_string(), serde_json::Value::Object(conversions));
        }
        println!("{}", serde_json::to_string_pretty(&serde_json::Value::Object(map))?);
        return Ok(());
    }

    for entry in families() {
        println!("{}", bold(entry.family.label()));
        for (src, _) in entry.conversions {
            println!("  {:<6} →  {}", src, target_list(&availability(converter, src)));
        }
    }
    println!("\n{}", dim(UNAVAILABLE_NOTE));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("/tmp/in/photo.png"), "jpg"),
            PathBuf::from("/tmp/in/photo.jpg")
        );
    }

    #[test]
    fn cli_parses_convert_flags() {
        let cli = Cli::try_parse_from([
            "fileshift", "convert", "a.wav", "--to", "mp3", "--bitrate", "192", "--json",
        ])
        .unwrap();
        let Command::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        let options = build_options(&args).unwrap();
        assert_eq!(options.bitrate, Some(192));
        assert!(args.json);
    }

    #[test]
    fn native_targets_flag_missing_collaborators() {
        let converter = Converter::default();
        let targets = availability(&converter, "txt");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].0, "pdf");
        assert_eq!(targets[0].1.as_deref(), Some("HTML-to-PDF renderer is not available"));
        assert_eq!(targets[1], ("docx", None));

        let json = targets_json(&targets);
        assert_eq!(json[0]["available"], false);
        assert_eq!(json[1]["available"], true);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let cli = Cli::try_parse_from(["fileshift", "convert", "a.pdf", "--to", "png", "--page", "0"]).unwrap();
        let Command::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert!(build_options(&args).is_err());
    }
}
