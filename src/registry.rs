//! Static format registry: which target extensions each source extension
//! can reach, grouped into families.
//!
//! The table is process-wide and read-only. Every lookup normalises its
//! argument (trim, strip one leading `.`, ASCII-lowercase), so `".PNG"`,
//! `"png"` and `" Png "` are the same key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named group of extensions sharing one conversion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Documents,
    Images,
    Audio,
    Video,
    Archives,
    Spreadsheets,
}

impl Family {
    pub fn label(&self) -> &'static str {
        match self {
            Family::Documents => "Documents",
            Family::Images => "Images",
            Family::Audio => "Audio",
            Family::Video => "Video",
            Family::Archives => "Archives",
            Family::Spreadsheets => "Spreadsheets",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One family's slice of the table.
#[derive(Debug)]
pub struct FamilyEntry {
    pub family: Family,
    pub conversions: &'static [(&'static str, &'static [&'static str])],
}

static REGISTRY: &[FamilyEntry] = &[
    FamilyEntry {
        family: Family::Documents,
        conversions: &[
            ("pdf", &["txt", "docx", "png", "jpg", "jpeg", "webp"]),
            ("docx", &["pdf", "txt"]),
            ("doc", &["pdf", "txt"]),
            ("txt", &["pdf", "docx"]),
        ],
    },
    FamilyEntry {
        family: Family::Images,
        conversions: &[
            ("png", &["jpg", "jpeg", "webp", "gif", "bmp", "tiff", "ico"]),
            ("jpg", &["png", "jpeg", "webp", "gif", "bmp", "tiff", "ico"]),
            ("jpeg", &["png", "jpg", "webp", "gif", "bmp", "tiff", "ico"]),
            ("webp", &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "ico"]),
            ("gif", &["png", "jpg", "jpeg", "webp", "bmp", "tiff", "ico"]),
            ("bmp", &["png", "jpg", "jpeg", "webp", "gif", "tiff", "ico"]),
            ("tiff", &["png", "jpg", "jpeg", "webp", "gif", "bmp", "ico"]),
            ("ico", &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff"]),
            ("svg", &["png", "jpg", "jpeg", "webp"]),
            ("heic", &["jpg", "jpeg", "png", "gif"]),
            ("heif", &["jpg", "jpeg", "png", "gif"]),
        ],
    },
    FamilyEntry {
        family: Family::Audio,
        conversions: &[
            ("mp3", &["wav", "ogg", "flac", "aac", "m4a"]),
            ("wav", &["mp3", "ogg", "flac", "aac", "m4a"]),
            ("ogg", &["mp3", "wav", "flac", "aac", "m4a"]),
            ("flac", &["mp3", "wav", "ogg", "aac", "m4a"]),
            ("aac", &["mp3", "wav", "ogg", "flac", "m4a"]),
            ("m4a", &["mp3", "wav", "ogg", "flac", "aac"]),
        ],
    },
    FamilyEntry {
        family: Family::Video,
        conversions: &[
            ("mp4", &["webm", "avi", "mov", "mkv"]),
            ("webm", &["mp4", "avi", "mov", "mkv"]),
            ("avi", &["mp4", "webm", "mov", "mkv"]),
            ("mov", &["mp4", "webm", "avi", "mkv"]),
            ("mkv", &["mp4", "webm", "avi", "mov"]),
        ],
    },
    FamilyEntry {
        family: Family::Archives,
        conversions: &[
            ("zip", &["gz", "tar"]),
            ("gz", &["zip"]),
            ("tar", &["zip"]),
        ],
    },
    FamilyEntry {
        family: Family::Spreadsheets,
        conversions: &[
            ("xlsx", &["csv", "xls", "ods", "pdf"]),
            ("xls", &["xlsx", "csv", "ods", "pdf"]),
            ("csv", &["xlsx", "xls", "ods", "pdf"]),
            ("ods", &["xlsx", "xls", "csv", "pdf"]),
        ],
    },
];

/// Normalise an extension for lookup: trim, drop one leading dot, lowercase.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim();
    trimmed
        .strip_prefix('.')
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

/// All families in table order.
pub fn families() -> &'static [FamilyEntry] {
    REGISTRY
}

/// Ordered list of targets reachable from `source`; empty when unknown.
pub fn supported_targets(source: &str) -> &'static [&'static str] {
    let key = normalize_extension(source);
    REGISTRY
        .iter()
        .flat_map(|entry| entry.conversions.iter())
        .find(|(src, _)| *src == key)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

pub fn is_supported(source: &str, target: &str) -> bool {
    let target = normalize_extension(target);
    supported_targets(source).iter().any(|t| *t == target)
}

/// The family whose source list contains `ext`.
pub fn family_of(ext: &str) -> Option<Family> {
    let key = normalize_extension(ext);
    REGISTRY
        .iter()
        .find(|entry| entry.conversions.iter().any(|(src, _)| *src == key))
        .map(|entry| entry.family)
}

/// MIME type for an output extension; `application/octet-stream` if unknown.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match normalize_extension(ext).as_str() {
        // Documents
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "html" | "htm" => "text/html",
        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "heif" => "image/heif",
        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        // Video
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        // Archives
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        // Spreadsheets
        "csv" => "text/csv",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalisation_strips_dot_and_case() {
        assert_eq!(normalize_extension(".PNG"), "png");
        assert_eq!(normalize_extension(" Jpg "), "jpg");
        assert_eq!(normalize_extension(""), "");
    }

    #[test]
    fn targets_are_ordered_and_case_insensitive() {
        assert_eq!(supported_targets(".ZIP"), &["gz", "tar"]);
        assert!(supported_targets("xyz").is_empty());
    }

    #[test]
    fn is_supported_checks_pairs() {
        assert!(is_supported("png", ".JPG"));
        assert!(!is_supported("png", "png"));
        assert!(!is_supported("txt", "xyz"));
        assert!(!is_supported("", "png"));
    }

    #[test]
    fn is_supported_is_pure() {
        let first = is_supported("docx", "pdf");
        for _ in 0..10 {
            assert_eq!(is_supported("docx", "pdf"), first);
        }
    }

    #[test]
    fn family_lookup() {
        assert_eq!(family_of("pdf"), Some(Family::Documents));
        assert_eq!(family_of("HEIC"), Some(Family::Images));
        assert_eq!(family_of("m4a"), Some(Family::Audio));
        assert_eq!(family_of("mkv"), Some(Family::Video));
        assert_eq!(family_of(".gz"), Some(Family::Archives));
        assert_eq!(family_of("ods"), Some(Family::Spreadsheets));
        assert_eq!(family_of("exe"), None);
    }

    #[test]
    fn every_source_belongs_to_exactly_one_family() {
        for entry in families() {
            for (src, targets) in entry.conversions {
                assert_eq!(family_of(src), Some(entry.family), "source {src}");
                assert!(!targets.contains(src), "{src} lists itself as a target");
            }
        }
    }

    #[test]
    fn every_target_has_a_mime_type() {
        for entry in families() {
            for (_, targets) in entry.conversions {
                for t in *targets {
                    assert_ne!(mime_for_extension(t), "application/octet-stream", "{t}");
                }
            }
        }
    }
}
