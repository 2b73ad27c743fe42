//! Error types for the fileshift library.
//!
//! Every pipeline returns `Result<ConvertedFile, ConvertError>`. The
//! dispatcher in [`crate::convert`] is the only place that turns an error
//! into a [`crate::output::ConversionResult::Failure`]; callers of
//! [`crate::Converter::convert`] never see a `ConvertError` directly, only
//! its rendered message.
//!
//! Message wording is part of the contract for two variants:
//! [`ConvertError::UnsupportedFormat`] / [`ConvertError::UnsupportedConversion`]
//! and [`ConvertError::FallbackExhausted`]. The rest only promise to name the
//! failing stage.

use thiserror::Error;

/// All failures a conversion can end in.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Routing errors ────────────────────────────────────────────────────
    /// The source extension belongs to no registered family.
    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    /// The family is known but the (source, target) pair has no branch.
    #[error("Conversion from {source_format} to {target_format} is not supported")]
    UnsupportedConversion {
        source_format: String,
        target_format: String,
    },

    /// A registered conversion that is deliberately switched off.
    #[error("{0}")]
    Unavailable(String),

    // ── Collaborator errors ───────────────────────────────────────────────
    /// No implementation of a collaborator was wired into the capabilities.
    #[error("{capability} is not available")]
    CapabilityUnavailable { capability: &'static str },

    /// A collaborator exists but failed to initialise.
    #[error("{stage} load error: {detail}")]
    CollaboratorLoad { stage: &'static str, detail: String },

    /// Source bytes could not be interpreted by the expected codec.
    #[error("{0}")]
    Decode(String),

    /// A decoded representation could not be serialised to the target.
    #[error("{0}")]
    Encode(String),

    /// Primary and fallback strategies both failed (image pipeline).
    #[error("{0}")]
    FallbackExhausted(String),

    /// A collaborator reported an error while doing its work.
    #[error("{0}")]
    Collaborator(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading the source or writing the output failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    pub(crate) fn unsupported(source: &str, target: &str) -> Self {
        ConvertError::UnsupportedConversion {
            source_format: source.to_string(),
            target_format: target.to_string(),
        }
    }

    pub(crate) fn missing(capability: &'static str) -> Self {
        ConvertError::CapabilityUnavailable { capability }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = ConvertError::UnsupportedFormat {
            extension: "xyz".into(),
        };
        assert_eq!(e.to_string(), "Unsupported file format: xyz");
    }

    #[test]
    fn unsupported_conversion_names_both_formats() {
        let msg = ConvertError::unsupported("txt", "xyz").to_string();
        assert!(msg.contains("txt"), "got: {msg}");
        assert!(msg.contains("xyz"), "got: {msg}");
        assert!(msg.contains("not supported"), "got: {msg}");
    }

    #[test]
    fn capability_display() {
        let e = ConvertError::missing("HEIC decoder");
        assert_eq!(e.to_string(), "HEIC decoder is not available");
    }

    #[test]
    fn load_error_names_stage() {
        let e = ConvertError::CollaboratorLoad {
            stage: "FFmpeg",
            detail: "binary not found".into(),
        };
        assert_eq!(e.to_string(), "FFmpeg load error: binary not found");
    }
}
