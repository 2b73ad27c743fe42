//! # fileshift
//!
//! Convert files between formats: images, documents, audio, video,
//! archives and spreadsheets.
//!
//! ## Why this crate?
//!
//! A file-conversion front end needs one question answered well: "given
//! this file and that target extension, give me the bytes or tell me why
//! not". fileshift keeps a static table of what converts to what, routes
//! every request to one pipeline per format family, and reports progress
//! and failures in the same shape whichever family did the work.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file + target
//!  │
//!  ├─ 1. Registry    source extension → family (Images, Documents, …)
//!  ├─ 2. Dispatch    family → pipeline, failure boundary
//!  ├─ 3. Pipeline    route table → collaborators (codecs, engines)
//!  └─ 4. Result      ConvertedFile or failure message
//! ```
//!
//! Codecs and engines are collaborators behind traits in
//! [`capabilities`]. [`Capabilities::native()`] wires the pure-Rust and
//! command-line implementations from [`native`]; tests and embedders can
//! inject their own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileshift::{ConversionOptions, Converter, NoopProgress, SourceFile};
//!
//! #[tokio::main]
//! async fn main() {
//!     let converter = Converter::default();
//!     let source = SourceFile::from_path("photo.png");
//!     let result = converter
//!         .convert(&source, "jpg", &ConversionOptions::default(), &NoopProgress)
//!         .await;
//!     match result.file() {
//!         Some(file) => println!("{} ({} bytes)", file.name, file.size()),
//!         None => eprintln!("failed: {}", result.error().unwrap_or_default()),
//!     }
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileshift` binary (clap + anyhow + tracing-subscriber) |
//! | `svg`   | on      | Native SVG rasterisation via resvg |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fileshift = { version = "0.1", default-features = false, features = ["svg"] }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capabilities;
pub mod config;
pub mod convert;
pub mod error;
pub mod native;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod registry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capabilities::Capabilities;
pub use config::{ConversionOptions, ConversionOptionsBuilder};
pub use convert::Converter;
pub use error::ConvertError;
pub use output::{ConversionResult, ConvertedFile};
pub use pipeline::input::SourceFile;
pub use progress::{ConversionProgress, NoopProgress, ProgressSink};
pub use registry::{family_of, is_supported, mime_for_extension, supported_targets, Family};
