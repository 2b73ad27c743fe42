//! Document pipeline: PDF, DOCX/DOC and plain text.
//!
//! Only specific (source, target) pairs are implemented. [`route`] maps a
//! pair to a [`DocumentRoute`]; any pair without an entry falls through to
//! an unsupported-conversion error before a collaborator is touched.
//!
//! ## PDF text heuristic
//!
//! PDF engines report text as fragments, some of which carry an
//! end-of-line marker. Fragments are concatenated in order; a newline is
//! appended after a fragment that ends a line, and a single space after any
//! other non-empty fragment (so adjacent words do not merge). Pages are
//! separated by a blank line and trailing spaces are trimmed.

use crate::capabilities::{Capabilities, HtmlRenderMode, PdfDocument, TextFragment};
use crate::config::{ConversionOptions, DEFAULT_PDF_IMAGE_QUALITY, DEFAULT_SCALE};
use crate::error::ConvertError;
use crate::output::ConvertedFile;
use crate::pipeline::encode::{draw_surface, encode_surface};
use crate::pipeline::html::{escape_html, wrap_document, DOCUMENT_CSS, TEXT_CSS};
use crate::pipeline::input::{replace_extension, SourceFile};
use crate::progress::{ProgressReporter, STAGE_CONVERTING, STAGE_FINALIZING, STAGE_LOADING};
use crate::registry::mime_for_extension;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TEXT_PROGRESS_START: u8 = 10;
const TEXT_PROGRESS_END: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRoute {
    PdfToText,
    PdfToDocx,
    PdfToImage,
    WordToText,
    WordToPdf,
    TextToPdf,
    TextToDocx,
}

pub fn route(source: &str, target: &str) -> Option<DocumentRoute> {
    use DocumentRoute::*;
    let r = match (source, target) {
        ("pdf", "txt") => PdfToText,
        ("pdf", "docx") => PdfToDocx,
        ("pdf", "png" | "jpg" | "jpeg" | "webp") => PdfToImage,
        ("docx" | "doc", "txt") => WordToText,
        ("docx" | "doc", "pdf") => WordToPdf,
        ("txt", "pdf") => TextToPdf,
        ("txt", "docx") => TextToDocx,
        _ => return None,
    };
    Some(r)
}

/// Whether `caps` can attempt `source → target` without a missing collaborator.
pub fn check(caps: &Capabilities, source: &str, target: &str) -> Result<(), ConvertError> {
    match route(source, target).ok_or_else(|| ConvertError::unsupported(source, target))? {
        DocumentRoute::PdfToText => {
            caps.pdf_engine()?;
        }
        DocumentRoute::PdfToDocx => {
            caps.pdf_engine()?;
            caps.docx_builder()?;
        }
        DocumentRoute::PdfToImage => {
            caps.pdf_engine()?;
            caps.image_codec()?;
        }
        DocumentRoute::WordToText => {
            caps.word_markup()?;
        }
        DocumentRoute::WordToPdf => {
            caps.word_markup()?;
            caps.html_pdf()?;
        }
        DocumentRoute::TextToPdf => {
            caps.html_pdf()?;
        }
        DocumentRoute::TextToDocx => {}
    }
    Ok(())
}

/// Document pipeline entry point.
pub async fn convert(
    caps: &Capabilities,
    source: &SourceFile,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<ConvertedFile, ConvertError> {
    let source_ext = source.extension();
    let chosen = route(&source_ext, target)
        .ok_or_else(|| ConvertError::unsupported(&source_ext, target))?;
    info!("Document conversion {} → {target} via {chosen:?}", source.name());

    progress.report(STAGE_LOADING, 0, format!("Loading {}", source.name()));
    let bytes = source.bytes().await?;

    let data = match chosen {
        DocumentRoute::PdfToText => {
            let doc = open_pdf(caps, bytes).await?;
            extract_pdf_text(doc.as_ref(), progress).await?.into_bytes()
        }
        DocumentRoute::PdfToDocx => {
            let doc = open_pdf(caps, bytes).await?;
            let text = extract_pdf_text(doc.as_ref(), progress).await?;
            let paragraphs = text.split('\n').map(str::to_string).collect::<Vec<_>>();
            progress.report(STAGE_FINALIZING, 95, format!("Building DOCX ({} paragraphs)", paragraphs.len()));
            caps.docx_builder()?.build(paragraphs).await?
        }
        DocumentRoute::PdfToImage => pdf_to_image(caps, bytes, target, options, progress).await?,
        DocumentRoute::WordToText => {
            progress.report(STAGE_CONVERTING, 30, "Extracting raw text");
            caps.word_markup()?.extract_raw_text(bytes).await?.into_bytes()
        }
        DocumentRoute::WordToPdf => word_to_pdf(caps, bytes, progress).await?,
        DocumentRoute::TextToPdf => {
            let text = String::from_utf8_lossy(&bytes);
            let body = format!("<pre>{}</pre>", escape_html(&text));
            progress.report(STAGE_CONVERTING, 40, "Rendering text to PDF");
            caps.html_pdf()?
                .render(wrap_document(&body, TEXT_CSS), HtmlRenderMode::Styled)
                .await?
        }
        DocumentRoute::TextToDocx => {
            // Relabelled only; no structural conversion.
            progress.report(STAGE_CONVERTING, 50, "Wrapping text as DOCX");
            bytes.to_vec()
        }
    };

    progress.complete(format!("Converted to {}", target.to_uppercase()));
    Ok(ConvertedFile::new(
        replace_extension(source.name(), target),
        mime_for_extension(target),
        data,
    ))
}

async fn open_pdf(caps: &Capabilities, bytes: Arc<[u8]>) -> Result<Box<dyn PdfDocument>, ConvertError> {
    let doc = caps.pdf_engine()?.open(bytes).await?;
    debug!("PDF opened: {} pages", doc.page_count());
    Ok(doc)
}

/// Append one page's fragments to `out` using the line heuristic.
pub fn append_fragments(out: &mut String, fragments: &[TextFragment]) {
    for fragment in fragments {
        out.push_str(&fragment.text);
        if fragment.has_eol {
            out.push('\n');
        } else if !fragment.text.is_empty() && !fragment.text.ends_with(char::is_whitespace) {
            out.push(' ');
        }
    }
}

/// Extract all text from an opened PDF, reporting progress per page.
pub async fn extract_pdf_text(
    doc: &dyn PdfDocument,
    progress: &ProgressReporter<'_>,
) -> Result<String, ConvertError> {
    let total = doc.page_count();
    let mut text = String::new();
    progress.report(STAGE_CONVERTING, TEXT_PROGRESS_START, format!("Extracting text from {total} pages"));

    for page in 1..=total {
        let fragments = doc.page_text(page).await?;
        append_fragments(&mut text, &fragments);
        if page < total {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push('\n');
        }
        progress.report_fraction(
            STAGE_CONVERTING,
            TEXT_PROGRESS_START,
            TEXT_PROGRESS_END,
            page,
            total,
            format!("Page {page}/{total}"),
        );
    }

    let trimmed = text.trim_end_matches([' ', '\t']).len();
    text.truncate(trimmed);
    Ok(text)
}

async fn pdf_to_image(
    caps: &Capabilities,
    bytes: Arc<[u8]>,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let codec = caps.image_codec()?;
    let doc = open_pdf(caps, bytes).await?;
    let page = options.page_or_first();
    if page > doc.page_count() {
        return Err(ConvertError::Collaborator(format!(
            "Page {page} is out of range (document has {} pages)",
            doc.page_count()
        )));
    }

    let scale = options.scale_or(DEFAULT_SCALE);
    progress.report(STAGE_CONVERTING, 30, format!("Rendering page {page} at {scale}x"));
    let raster = doc.render_page(page, scale).await?;

    let size = options.target_dimensions(raster.dimensions());
    let surface = draw_surface(&raster, size, target);
    progress.report(STAGE_FINALIZING, 70, "Encoding page image");
    encode_surface(
        &**codec,
        surface,
        target,
        options.quality_or(DEFAULT_PDF_IMAGE_QUALITY),
    )
    .await
}

/// DOCX/DOC → PDF: styled tier first, plain-HTML canvas tier on any failure.
async fn word_to_pdf(
    caps: &Capabilities,
    bytes: Arc<[u8]>,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let markup = caps.word_markup()?;

    progress.report(STAGE_CONVERTING, 20, "Converting document to styled HTML");
    let styled = async {
        let html = markup.to_styled_html(Arc::clone(&bytes)).await?;
        progress.report(STAGE_CONVERTING, 50, "Rendering styled HTML to PDF");
        caps.html_pdf()?
            .render(wrap_document(&html, DOCUMENT_CSS), HtmlRenderMode::Styled)
            .await
    }
    .await;

    match styled {
        Ok(pdf) => Ok(pdf),
        Err(e) => {
            warn!("Styled DOCX rendering failed, using plain HTML fallback: {e}");
            progress.report(STAGE_CONVERTING, 60, "Retrying with plain HTML");
            let html = markup.to_plain_html(bytes).await?;
            progress.report(STAGE_FINALIZING, 75, "Rendering plain HTML to PDF");
            caps.html_pdf()?
                .render(wrap_document(&html, DOCUMENT_CSS), HtmlRenderMode::Canvas)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use async_trait::async_trait;
    use image::RgbaImage;

    struct Pages(Vec<Vec<TextFragment>>);

    #[async_trait]
    impl PdfDocument for Pages {
        fn page_count(&self) -> usize {
            self.0.len()
        }

        async fn page_text(&self, page: usize) -> Result<Vec<TextFragment>, ConvertError> {
            Ok(self.0[page - 1].clone())
        }

        async fn render_page(&self, _page: usize, _scale: f32) -> Result<RgbaImage, ConvertError> {
            Ok(RgbaImage::new(1, 1))
        }
    }

    async fn extract(pages: Vec<Vec<TextFragment>>) -> String {
        let reporter = ProgressReporter::new(&NoopProgress);
        extract_pdf_text(&Pages(pages), &reporter).await.unwrap()
    }

    #[test]
    fn route_table() {
        assert_eq!(route("pdf", "jpeg"), Some(DocumentRoute::PdfToImage));
        assert_eq!(route("doc", "pdf"), Some(DocumentRoute::WordToPdf));
        assert_eq!(route("txt", "xyz"), None);
        assert_eq!(route("docx", "docx"), None);
    }

    #[tokio::test]
    async fn fragment_without_eol_gets_a_space() {
        let text = extract(vec![vec![
            TextFragment::new("Hello", false),
            TextFragment::new("world", true),
        ]])
        .await;
        assert_eq!(text, "Hello world\n");
    }

    #[tokio::test]
    async fn pages_are_separated_by_blank_line() {
        let text = extract(vec![
            vec![TextFragment::new("one", true)],
            vec![TextFragment::new("two", false)],
        ])
        .await;
        assert_eq!(text, "one\n\ntwo");
    }

    #[tokio::test]
    async fn empty_fragments_add_nothing() {
        let text = extract(vec![vec![
            TextFragment::new("a", false),
            TextFragment::new("", false),
            TextFragment::new("b ", false),
            TextFragment::new("c", false),
        ]])
        .await;
        assert_eq!(text, "a b c");
    }

    #[tokio::test]
    async fn empty_document_is_empty_text() {
        assert_eq!(extract(vec![]).await, "");
    }
}
