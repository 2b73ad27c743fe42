//! Per-family conversion pipelines.
//!
//! Every family pipeline exposes the same entry point,
//! `convert(caps, source, target, options, progress)`, and owns the
//! route table for its (source, target) pairs. Pairs without a route fail
//! with [`crate::ConvertError::UnsupportedConversion`] before any
//! collaborator is touched.
//!
//! ## Data Flow
//!
//! ```text
//! SourceFile ──▶ route ──▶ collaborators ──▶ ConvertedFile
//!  (name+bytes)  (table)   (Capabilities)    (name, MIME, bytes)
//! ```
//!
//! 1. [`input`]: the source file, its extension and output naming
//! 2. [`image`]: raster strategy chain, SVG and HEIC paths
//! 3. [`document`]: PDF, DOCX/DOC and plain text
//! 4. [`media`]: audio and video over one transcoder session
//! 5. [`archive`]: ZIP, GZIP and TAR repacking
//! 6. [`spreadsheet`]: tabular formats and PDF export
//!
//! [`encode`] and [`html`] hold helpers shared by several pipelines.

pub mod archive;
pub mod document;
pub mod encode;
pub mod html;
pub mod image;
pub mod input;
pub mod media;
pub mod spreadsheet;
