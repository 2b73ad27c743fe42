//! [`ImageMagick`] fallback that runs the `magick` executable.

use crate::capabilities::{ImageMagick, MagickOutcome};
use crate::error::ConvertError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Environment variable overriding the ImageMagick executable.
pub const MAGICK_ENV: &str = "FILESHIFT_MAGICK";

#[derive(Debug, Clone)]
pub struct MagickCli {
    program: PathBuf,
}

impl MagickCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `$FILESHIFT_MAGICK`, or `magick` from `PATH`.
    pub fn from_env() -> Self {
        match std::env::var(MAGICK_ENV) {
            Ok(p) if !p.is_empty() => Self::new(p),
            _ => Self::new("magick"),
        }
    }
}

#[async_trait]
impl ImageMagick for MagickCli {
    async fn convert(
        &self,
        bytes: Arc<[u8]>,
        source_extension: &str,
        target_extension: &str,
    ) -> Result<MagickOutcome, ConvertError> {
        let dir = tempfile::Builder::new()
            .prefix("fileshift-magick-")
            .tempdir()
            .map_err(|e| ConvertError::Collaborator(format!("temporary directory: {e}")))?;
        let input = dir.path().join(format!("input.{source_extension}"));
        let output = dir.path().join(format!("output.{target_extension}"));
        tokio::fs::write(&input, &bytes).await.map_err(|e| ConvertError::Io {
            path: input.display().to_string(),
            source: e,
        })?;

        let result = Command::new(&self.program)
            .arg(&input)
            .arg(&output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ConvertError::Collaborator(format!("{}: {e}", self.program.display())))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("magick exited with {}", result.status)
            } else {
                stderr
            };
            return Ok(MagickOutcome::Rejected(reason));
        }

        match tokio::fs::read(&output).await {
            Ok(data) => {
                debug!("magick wrote {} bytes", data.len());
                Ok(MagickOutcome::Converted(data))
            }
            Err(e) => Ok(MagickOutcome::Rejected(format!("no output produced: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_raises() {
        let magick = MagickCli::new("/nonexistent/fileshift-magick");
        let result = magick.convert(Arc::from(&b"x"[..]), "png", "jpg").await;
        assert!(matches!(result, Err(ConvertError::Collaborator(_))));
    }
}
