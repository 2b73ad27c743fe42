//! [`Transcoder`] that drives the `ffmpeg` executable.
//!
//! A session is a private temporary directory standing in for the engine's
//! virtual filesystem. `load` checks the executable and creates the
//! directory, file operations are confined to it, and `terminate` removes
//! it. Progress comes from `-progress pipe:2`: the input duration is read
//! from the banner and each `out_time_us=` line is turned into a ratio.

use crate::capabilities::Transcoder;
use crate::error::ConvertError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable overriding the ffmpeg executable.
pub const FFMPEG_ENV: &str = "FILESHIFT_FFMPEG";

const STDERR_TAIL_LINES: usize = 12;

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid regex"));

static OUT_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^out_time_(?:us|ms)=(-?\d+)$").expect("valid regex"));

pub struct FfmpegTranscoder {
    program: PathBuf,
    session: Mutex<Option<TempDir>>,
}

impl std::fmt::Debug for FfmpegTranscoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegTranscoder")
            .field("program", &self.program)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            session: Mutex::new(None),
        }
    }

    /// `$FILESHIFT_FFMPEG`, or `ffmpeg` from `PATH`.
    pub fn from_env() -> Self {
        match std::env::var(FFMPEG_ENV) {
            Ok(p) if !p.is_empty() => Self::new(p),
            _ => Self::new("ffmpeg"),
        }
    }

    fn workdir(&self) -> Result<PathBuf, ConvertError> {
        let guard = self
            .session
            .lock()
            .map_err(|_| ConvertError::Internal("FFmpeg session lock poisoned".into()))?;
        guard
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| ConvertError::Collaborator("FFmpeg is not loaded".into()))
    }

    fn session_path(&self, name: &str) -> Result<PathBuf, ConvertError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(ConvertError::Collaborator(format!("Invalid file name '{name}'")));
        }
        Ok(self.workdir()?.join(name))
    }
}

/// Seconds from an ffmpeg `Duration: HH:MM:SS.xx` banner line.
pub(crate) fn parse_duration(line: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(line)?;
    let h: f64 = caps[1].parse().ok()?;
    let m: f64 = caps[2].parse().ok()?;
    let s: f64 = caps[3].parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// Seconds from an `out_time_us=` (or the misnamed `out_time_ms=`) line.
pub(crate) fn parse_out_time(line: &str) -> Option<f64> {
    let caps = OUT_TIME_RE.captures(line.trim())?;
    let micros: i64 = caps[1].parse().ok()?;
    Some(micros.max(0) as f64 / 1_000_000.0)
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> ConvertError + '_ {
    move |e| ConvertError::Io {
        path: path.display().to_string(),
        source: e,
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn is_loaded(&self) -> bool {
        self.session.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    async fn load(&self) -> Result<(), ConvertError> {
        let load_err = |detail: String| ConvertError::CollaboratorLoad {
            stage: "FFmpeg",
            detail,
        };
        let status = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| load_err(format!("{}: {e}", self.program.display())))?;
        if !status.success() {
            return Err(load_err(format!("{} -version exited with {status}", self.program.display())));
        }

        let dir = tempfile::Builder::new()
            .prefix("fileshift-ffmpeg-")
            .tempdir()
            .map_err(|e| load_err(format!("temporary directory: {e}")))?;
        info!("FFmpeg session at {}", dir.path().display());
        let mut guard = self
            .session
            .lock()
            .map_err(|_| ConvertError::Internal("FFmpeg session lock poisoned".into()))?;
        *guard = Some(dir);
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), ConvertError> {
        let path = self.session_path(name)?;
        tokio::fs::write(&path, data).await.map_err(io_error(&path))
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, ConvertError> {
        let path = self.session_path(name)?;
        tokio::fs::read(&path).await.map_err(io_error(&path))
    }

    async fn delete_file(&self, name: &str) -> Result<(), ConvertError> {
        let path = self.session_path(name)?;
        tokio::fs::remove_file(&path).await.map_err(io_error(&path))
    }

    async fn exec(&self, args: &[String], on_ratio: &(dyn Fn(f64) + Send + Sync)) -> Result<(), ConvertError> {
        let dir = self.workdir()?;
        let mut child = Command::new(&self.program)
            .current_dir(&dir)
            .args(["-hide_banner", "-y", "-nostats", "-progress", "pipe:2"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConvertError::Collaborator(format!("Failed to start FFmpeg: {e}")))?;

        let mut duration: Option<f64> = None;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            // Metadata echoed by ffmpeg is raw bytes, not necessarily UTF-8.
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let read = reader
                    .read_until(b'\n', &mut buf)
                    .await
                    .map_err(|e| ConvertError::Collaborator(format!("FFmpeg output: {e}")))?;
                if read == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
                if duration.is_none() {
                    duration = parse_duration(&line).filter(|d| *d > 0.0);
                }
                if let Some(done) = parse_out_time(&line) {
                    if let Some(total) = duration {
                        on_ratio((done / total).clamp(0.0, 1.0));
                    }
                } else if line.trim() == "progress=end" {
                    on_ratio(1.0);
                } else if !line.contains('=') {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ConvertError::Collaborator(format!("FFmpeg wait failed: {e}")))?;
        if !status.success() {
            let detail = tail.into_iter().collect::<Vec<_>>().join("\n");
            warn!("FFmpeg exited with {status}");
            return Err(ConvertError::Collaborator(format!("FFmpeg exited with {status}: {detail}")));
        }
        debug!("FFmpeg finished: {}", args.join(" "));
        Ok(())
    }

    async fn terminate(&self) {
        if let Ok(mut guard) = self.session.lock() {
            if let Some(dir) = guard.take() {
                debug!("Removing FFmpeg session {}", dir.path().display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_banner() {
        let line = "  Duration: 00:01:02.50, start: 0.000000, bitrate: 128 kb/s";
        assert_eq!(parse_duration(line), Some(62.5));
        assert_eq!(parse_duration("Stream #0:0: Audio"), None);
    }

    #[test]
    fn out_time_lines() {
        assert_eq!(parse_out_time("out_time_us=31250000"), Some(31.25));
        assert_eq!(parse_out_time("out_time_ms=1000000"), Some(1.0));
        assert_eq!(parse_out_time("out_time_us=-5"), Some(0.0));
        assert_eq!(parse_out_time("out_time=00:00:01.00"), None);
    }

    #[tokio::test]
    async fn file_ops_need_a_session() {
        let t = FfmpegTranscoder::new("ffmpeg");
        assert!(!t.is_loaded());
        assert!(t.write_file("input.wav", b"x").await.is_err());
    }

    #[tokio::test]
    async fn missing_executable_is_a_load_error() {
        let t = FfmpegTranscoder::new("/nonexistent/fileshift-ffmpeg");
        let err = t.load().await.unwrap_err();
        assert!(err.to_string().starts_with("FFmpeg load error:"), "{err}");
        assert!(!t.is_loaded());
    }

    /// Write an executable shell script standing in for ffmpeg.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_metadata_does_not_fail_the_run() {
        let bin = tempfile::tempdir().unwrap();
        let script = fake_ffmpeg(
            bin.path(),
            r#"[ "$1" = "-version" ] && exit 0
printf '  Duration: 00:00:02.00, start: 0.000000\n' >&2
printf '    title           : Caf\351\n' >&2
printf 'out_time_us=1000000\n' >&2
printf 'progress=end\n' >&2
for last; do :; done
printf done > "$last""#,
        );
        let t = FfmpegTranscoder::new(script);
        t.load().await.unwrap();

        let ratios = Mutex::new(Vec::new());
        let record = |r: f64| ratios.lock().unwrap().push(r);
        let args = ["-i".to_string(), "input.wav".to_string(), "output.mp3".to_string()];
        t.exec(&args, &record).await.unwrap();

        assert_eq!(*ratios.lock().unwrap(), [0.5, 1.0]);
        assert_eq!(t.read_file("output.mp3").await.unwrap(), b"done");
        t.terminate().await;
        assert!(!t.is_loaded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_run_reports_stderr_tail() {
        let bin = tempfile::tempdir().unwrap();
        let script = fake_ffmpeg(
            bin.path(),
            r#"[ "$1" = "-version" ] && exit 0
printf 'Unknown encoder \377x\n' >&2
exit 1"#,
        );
        let t = FfmpegTranscoder::new(script);
        t.load().await.unwrap();
        let err = t.exec(&["-i".to_string()], &|_: f64| {}).await.unwrap_err().to_string();
        assert!(err.starts_with("FFmpeg exited with"), "{err}");
        assert!(err.contains("Unknown encoder"), "{err}");
    }

    #[test]
    fn names_cannot_escape_the_session() {
        let t = FfmpegTranscoder::new("ffmpeg");
        assert!(t.session_path("../etc/passwd").is_err());
        assert!(t.session_path("").is_err());
    }
}
