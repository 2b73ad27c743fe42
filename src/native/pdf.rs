//! [`PdfEngine`] backed by pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Every pdfium call runs on the blocking pool, and each call binds and
//! loads the document afresh so no pdfium handle crosses threads.
//!
//! ## Why extract all text on open?
//!
//! Text extraction is cheap next to loading, and the document pipeline
//! always reads every page in order. [`PdfiumDocument`] keeps the per-page
//! fragments plus the raw bytes; only rasterisation goes back to pdfium.

use super::blocking;
use crate::capabilities::{PdfDocument, PdfEngine, TextFragment};
use crate::error::ConvertError;
use async_trait::async_trait;
use image::RgbaImage;
use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium library to bind.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumEngine;

/// An opened PDF: page text extracted up front, raw bytes kept for rendering.
pub struct PdfiumDocument {
    bytes: Arc<[u8]>,
    pages: Vec<Vec<TextFragment>>,
}

/// Bind pdfium: `PDFIUM_LIB_PATH` when set, else the system library.
fn bind() -> Result<Pdfium, ConvertError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_system_library(),
    };
    bindings.map(Pdfium::new).map_err(|e| ConvertError::CollaboratorLoad {
        stage: "PDF engine",
        detail: e.to_string(),
    })
}

fn corrupt(e: impl std::fmt::Debug) -> ConvertError {
    ConvertError::Decode(format!("Failed to open PDF: {e:?}"))
}

/// Split a page's text into one fragment per line. pdfium reports line
/// breaks inside the text, so every line but a trailing partial one ends
/// a line.
pub(crate) fn fragments_from_page_text(text: &str) -> Vec<TextFragment> {
    let mut fragments = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find('\n') {
        let line = rest[..idx].trim_end_matches('\r');
        fragments.push(TextFragment::new(line, true));
        rest = &rest[idx + 1..];
    }
    if !rest.is_empty() {
        fragments.push(TextFragment::new(rest, false));
    }
    fragments
}

fn open_blocking(bytes: &[u8]) -> Result<Vec<Vec<TextFragment>>, ConvertError> {
    let pdfium = bind()?;
    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(corrupt)?;
    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut out = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| ConvertError::Collaborator(format!("Text extraction failed on page {}: {e:?}", idx + 1)))?;
        let fragments = fragments_from_page_text(&text.all());
        debug!("Page {} → {} fragments", idx + 1, fragments.len());
        out.push(fragments);
    }
    Ok(out)
}

fn render_blocking(bytes: &[u8], page: usize, scale: f32) -> Result<RgbaImage, ConvertError> {
    let pdfium = bind()?;
    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(corrupt)?;
    let index = u16::try_from(page.saturating_sub(1))
        .map_err(|_| ConvertError::Collaborator(format!("Page {page} is out of range")))?;
    let pdf_page = document
        .pages()
        .get(index)
        .map_err(|e| ConvertError::Collaborator(format!("Page {page}: {e:?}")))?;

    let config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = pdf_page
        .render_with_config(&config)
        .map_err(|e| ConvertError::Collaborator(format!("Rasterisation failed on page {page}: {e:?}")))?;
    let image = bitmap.as_image().to_rgba8();
    debug!("Rendered page {page} → {}x{} px", image.width(), image.height());
    Ok(image)
}

#[async_trait]
impl PdfEngine for PdfiumEngine {
    async fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PdfDocument>, ConvertError> {
        let for_task = Arc::clone(&bytes);
        let pages = blocking("PDF open", move || open_blocking(&for_task)).await?;
        Ok(Box::new(PdfiumDocument { bytes, pages }))
    }
}

#[async_trait]
impl PdfDocument for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn page_text(&self, page: usize) -> Result<Vec<TextFragment>, ConvertError> {
        page.checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .cloned()
            .ok_or_else(|| ConvertError::Collaborator(format!("Page {page} is out of range")))
    }

    async fn render_page(&self, page: usize, scale: f32) -> Result<RgbaImage, ConvertError> {
        let bytes = Arc::clone(&self.bytes);
        blocking("PDF render", move || render_blocking(&bytes, page, scale)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_become_eol_fragments() {
        let frags = fragments_from_page_text("Hello world\r\nsecond\ntail");
        assert_eq!(
            frags,
            vec![
                TextFragment::new("Hello world", true),
                TextFragment::new("second", true),
                TextFragment::new("tail", false),
            ]
        );
    }

    #[test]
    fn empty_page_has_no_fragments() {
        assert!(fragments_from_page_text("").is_empty());
    }

    #[tokio::test]
    async fn page_text_is_one_based() {
        let doc = PdfiumDocument {
            bytes: Arc::from(&b""[..]),
            pages: vec![vec![TextFragment::new("first", true)]],
        };
        assert_eq!(doc.page_text(1).await.unwrap()[0].text, "first");
        assert!(doc.page_text(0).await.is_err());
        assert!(doc.page_text(2).await.is_err());
    }
}
