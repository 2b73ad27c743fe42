//! Output types: the converted file and the per-call result.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// The bytes produced by a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedFile {
    /// Output file name, usually the source name with the target extension.
    pub name: String,
    /// MIME type of `data`.
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ConvertedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// `data:` URL embedding the bytes, for consumers that want the output
    /// inline (JSON, HTML previews).
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

/// Outcome of one [`crate::Converter::convert`] call.
///
/// Serialises with a `success` boolean discriminant so JSON consumers see
/// `{"success": true, "file": {...}, ...}` or `{"success": false, "error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversionResult {
    Success {
        success: SuccessTag,
        file: ConvertedFile,
        original_name: String,
        target_format: String,
        file_size: u64,
    },
    Failure {
        success: FailureTag,
        error: String,
        original_name: String,
        target_format: String,
    },
}

/// Serialises as `true`; only accepts `true` when deserialising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuccessTag;

/// Serialises as `false`; only accepts `false` when deserialising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureTag;

macro_rules! bool_tag {
    ($ty:ty, $value:expr) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_bool($value)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                if bool::deserialize(d)? == $value {
                    Ok(Self)
                } else {
                    Err(serde::de::Error::custom(concat!(
                        "expected success = ",
                        stringify!($value)
                    )))
                }
            }
        }
    };
}

bool_tag!(SuccessTag, true);
bool_tag!(FailureTag, false);

impl ConversionResult {
    pub fn success(
        file: ConvertedFile,
        original_name: impl Into<String>,
        target_format: impl Into<String>,
    ) -> Self {
        let file_size = file.size();
        ConversionResult::Success {
            success: SuccessTag,
            file,
            original_name: original_name.into(),
            target_format: target_format.into(),
            file_size,
        }
    }

    pub fn failure(
        error: impl Into<String>,
        original_name: impl Into<String>,
        target_format: impl Into<String>,
    ) -> Self {
        ConversionResult::Failure {
            success: FailureTag,
            error: error.into(),
            original_name: original_name.into(),
            target_format: target_format.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Success { .. })
    }

    pub fn file(&self) -> Option<&ConvertedFile> {
        match self {
            ConversionResult::Success { file, .. } => Some(file),
            ConversionResult::Failure { .. } => None,
        }
    }

    pub fn into_file(self) -> Option<ConvertedFile> {
        match self {
            ConversionResult::Success { file, .. } => Some(file),
            ConversionResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ConversionResult::Success { .. } => None,
            ConversionResult::Failure { error, .. } => Some(error),
        }
    }

    pub fn original_name(&self) -> &str {
        match self {
            ConversionResult::Success { original_name, .. }
            | ConversionResult::Failure { original_name, .. } => original_name,
        }
    }

    pub fn target_format(&self) -> &str {
        match self {
            ConversionResult::Success { target_format, .. }
            | ConversionResult::Failure { target_format, .. } => target_format,
        }
    }
}
