//! Source resolution: the file being converted and its derived names.
//!
//! A [`SourceFile`] is cheap to build. Bytes held on disk are only read
//! when a pipeline first asks for them, so a request that fails routing
//! (unknown extension, unsupported pair) never touches the filesystem.

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// The input to a conversion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    origin: Origin,
    bytes: Arc<OnceCell<Arc<[u8]>>>,
}

#[derive(Debug, Clone)]
enum Origin {
    Memory,
    Path(PathBuf),
}

impl SourceFile {
    /// A file whose bytes are already in memory.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let cell = OnceCell::new_with(Some(Arc::<[u8]>::from(bytes.into())));
        Self {
            name: name.into(),
            origin: Origin::Memory,
            bytes: Arc::new(cell),
        }
    }

    /// A file on disk, read lazily on first access.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            origin: Origin::Path(path),
            bytes: Arc::new(OnceCell::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased text after the last `.` of the name; empty when there is none.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }

    /// Materialise the bytes, reading from disk on first call.
    pub async fn bytes(&self) -> Result<Arc<[u8]>, ConvertError> {
        let bytes = self
            .bytes
            .get_or_try_init(|| async {
                let data = match &self.origin {
                    Origin::Memory => Vec::new(),
                    Origin::Path(path) => {
                        let data = tokio::fs::read(path).await.map_err(|e| ConvertError::Io {
                            path: path.display().to_string(),
                            source: e,
                        })?;
                        debug!("Read {} bytes from {}", data.len(), path.display());
                        data
                    }
                };
                Ok::<_, ConvertError>(Arc::<[u8]>::from(data))
            })
            .await?;
        Ok(Arc::clone(bytes))
    }
}

/// Lowercased extension of `name`: the text after the last `.`.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[idx + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Replace the extension of `name` with `target`, or append it when the
/// name has none.
pub fn replace_extension(name: &str, target: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}.{}", &name[..idx], target),
        _ => format!("{}.{}", name, target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_after_last_dot() {
        assert_eq!(extension_of("photo.PNG"), "png");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn replace_extension_cases() {
        assert_eq!(replace_extension("photo.png", "jpg"), "photo.jpg");
        assert_eq!(replace_extension("data.txt.gz", "zip"), "data.txt.zip");
        assert_eq!(replace_extension("README", "txt"), "README.txt");
        assert_eq!(replace_extension(".hidden", "txt"), ".hidden.txt");
    }

    #[tokio::test]
    async fn memory_source_returns_bytes() {
        let src = SourceFile::from_bytes("a.txt", b"hello".to_vec());
        assert_eq!(&*src.bytes().await.unwrap(), b"hello");
        assert_eq!(src.extension(), "txt");
    }

    #[tokio::test]
    async fn path_source_reads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.TXT");
        std::fs::write(&path, b"lazy").unwrap();
        let src = SourceFile::from_path(&path);
        assert_eq!(src.name(), "notes.TXT");
        assert_eq!(src.extension(), "txt");
        assert_eq!(&*src.bytes().await.unwrap(), b"lazy");
    }

    #[test]
    fn missing_path_is_io_error() {
        let src = SourceFile::from_path("/definitely/not/here.pdf");
        let err = tokio_test::block_on(src.bytes()).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }
}
