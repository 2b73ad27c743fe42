//! [`ArchiveCodec`] backed by `zip`, `tar` and `flate2`.

use super::blocking;
use crate::capabilities::{ArchiveCodec, ArchiveEntry, TarBuilder};
use crate::error::ConvertError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeArchiveCodec;

fn zip_err(e: impl std::fmt::Display) -> ConvertError {
    ConvertError::Collaborator(format!("ZIP error: {e}"))
}

fn io_err(what: &str) -> impl Fn(std::io::Error) -> ConvertError + '_ {
    move |e| ConvertError::Collaborator(format!("{what}: {e}"))
}

/// Upper bound on the buffer reserved up front for one entry; the header's
/// declared size is untrusted.
const MAX_ENTRY_PREALLOC: u64 = 1 << 20;

fn entry_capacity(declared: u64) -> usize {
    declared.min(MAX_ENTRY_PREALLOC) as usize
}

pub(crate) fn read_zip(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, ConvertError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_err)?;
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(zip_err)?;
        let name = file.name().to_string();
        if file.is_dir() {
            entries.push(ArchiveEntry::dir(name));
            continue;
        }
        let mut data = Vec::with_capacity(entry_capacity(file.size()));
        file.read_to_end(&mut data).map_err(io_err("ZIP entry read failed"))?;
        entries.push(ArchiveEntry::file(name, data));
    }
    debug!("Read {} ZIP entries", entries.len());
    Ok(entries)
}

pub(crate) fn write_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>, ConvertError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in entries {
        if entry.is_dir {
            zip.add_directory(entry.name.as_str(), options).map_err(zip_err)?;
        } else {
            zip.start_file(entry.name.as_str(), options).map_err(zip_err)?;
            zip.write_all(&entry.data).map_err(io_err("ZIP entry write failed"))?;
        }
    }
    Ok(zip.finish().map_err(zip_err)?.into_inner())
}

/// Accumulates a ustar archive in memory.
struct MemoryTar {
    builder: tar::Builder<Vec<u8>>,
}

impl TarBuilder for MemoryTar {
    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), ConvertError> {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        self.builder
            .append_data(&mut header, name, data)
            .map_err(io_err("TAR append failed"))
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, ConvertError> {
        self.builder.into_inner().map_err(io_err("TAR finish failed"))
    }
}

pub(crate) fn gzip(data: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(io_err("GZIP write failed"))?;
    encoder.finish().map_err(io_err("GZIP finish failed"))
}

pub(crate) fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(io_err("GZIP decode failed"))?;
    Ok(out)
}

#[async_trait]
impl ArchiveCodec for NativeArchiveCodec {
    async fn read_zip(&self, bytes: Arc<[u8]>) -> Result<Vec<ArchiveEntry>, ConvertError> {
        blocking("ZIP read", move || read_zip(&bytes)).await
    }

    async fn write_zip(&self, entries: Vec<ArchiveEntry>) -> Result<Vec<u8>, ConvertError> {
        blocking("ZIP write", move || write_zip(&entries)).await
    }

    fn tar_builder(&self) -> Box<dyn TarBuilder> {
        Box::new(MemoryTar {
            builder: tar::Builder::new(Vec::new()),
        })
    }

    async fn gzip(&self, data: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
        blocking("GZIP", move || gzip(&data)).await
    }

    async fn gunzip(&self, bytes: Arc<[u8]>) -> Result<Vec<u8>, ConvertError> {
        blocking("GUNZIP", move || gunzip(&bytes)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_listing_order_and_dirs_survive() {
        let zip = write_zip(&[
            ArchiveEntry::dir("docs/"),
            ArchiveEntry::file("docs/a.txt", b"alpha".to_vec()),
            ArchiveEntry::file("b.txt", b"beta".to_vec()),
        ])
        .unwrap();
        let entries = read_zip(&zip).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["docs/", "docs/a.txt", "b.txt"]);
        assert!(entries[0].is_dir);
        assert_eq!(entries[2].data, b"beta");
    }

    #[test]
    fn tar_entries_are_readable() {
        let mut builder = NativeArchiveCodec.tar_builder();
        builder.append("hello.txt", b"hi there").unwrap();
        let bytes = builder.finish().unwrap();

        let mut archive = tar::Archive::new(Cursor::new(bytes));
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some("hello.txt"));
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        assert_eq!(body, "hi there");
        assert!(entries.next().is_none());
    }

    #[test]
    fn gzip_streams_decode() {
        let packed = gzip(b"payload").unwrap();
        assert_eq!(&packed[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&packed).unwrap(), b"payload");
    }

    #[test]
    fn declared_entry_size_is_capped() {
        assert_eq!(entry_capacity(42), 42);
        assert_eq!(entry_capacity(u64::MAX), 1 << 20);
    }

    #[test]
    fn entries_larger_than_the_reservation_read_fully() {
        let big = vec![7u8; (1 << 20) + 4096];
        let zip = write_zip(&[ArchiveEntry::file("big.bin", big.clone())]).unwrap();
        let entries = read_zip(&zip).unwrap();
        assert_eq!(entries[0].data, big);
    }

    #[test]
    fn corrupt_zip_is_an_error() {
        assert!(read_zip(b"PK\x03\x04 truncated").is_err());
    }
}
