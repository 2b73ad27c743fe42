//! [`WordMarkup`] and [`DocxBuilder`] backed by `docx-rs`.
//!
//! Only the OOXML (`.docx`) container is understood; legacy binary `.doc`
//! files fail to parse and surface as a collaborator error.

use super::blocking;
use crate::capabilities::{DocxBuilder, WordMarkup};
use crate::error::ConvertError;
use crate::output::ConvertedFile;
use crate::pipeline::html::escape_html;
use async_trait::async_trait;
use docx_rs::{
    read_docx, DocumentChild, Docx, DrawingData, Paragraph, ParagraphChild, Pic, Run, RunChild, Table,
    TableCellContent, TableChild, TableRowChild,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct DocxMarkup;

#[derive(Debug, Clone, Copy, Default)]
pub struct DocxWriter;

fn parse(bytes: &[u8]) -> Result<Docx, ConvertError> {
    read_docx(bytes).map_err(|e| ConvertError::Collaborator(format!("Failed to parse DOCX: {e}")))
}

// ── Text ─────────────────────────────────────────────────────────────────

fn run_text(run: &Run, out: &mut String) {
    for child in &run.children {
        match child {
            RunChild::Text(text) => out.push_str(&text.text),
            RunChild::Tab(_) => out.push('\t'),
            RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

fn paragraph_text(para: &Paragraph) -> String {
    let mut out = String::new();
    for child in &para.children {
        match child {
            ParagraphChild::Run(run) => run_text(run, &mut out),
            ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let ParagraphChild::Run(run) = inner {
                        run_text(run, &mut out);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn table_rows(table: &Table) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row in &table.rows {
        let TableChild::TableRow(tr) = row;
        let mut cells = Vec::new();
        for cell in &tr.cells {
            let TableRowChild::TableCell(tc) = cell;
            let text = tc
                .children
                .iter()
                .filter_map(|c| match c {
                    TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            cells.push(text);
        }
        rows.push(cells);
    }
    rows
}

/// Body text: one line per paragraph, tab-separated table cells.
pub(crate) fn raw_text(doc: &Docx) -> String {
    let mut out = String::new();
    for child in &doc.document.children {
        match child {
            DocumentChild::Paragraph(para) => {
                out.push_str(&paragraph_text(para));
                out.push('\n');
            }
            DocumentChild::Table(table) => {
                for row in table_rows(table) {
                    out.push_str(&row.join("\t"));
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
    out
}

// ── HTML ─────────────────────────────────────────────────────────────────

/// EMUs per CSS pixel at 96 dpi.
const EMU_PER_PX: u32 = 9525;

/// Embedded media of a parsed package, keyed by relationship id.
type MediaMap<'a> = HashMap<&'a str, &'a [u8]>;

fn media_map(doc: &Docx) -> MediaMap<'_> {
    doc.images
        .iter()
        .map(|(id, _path, _image, png)| (id.as_str(), png.0.as_slice()))
        .collect()
}

/// `<img>` with the picture inlined as a data URI. Pictures of a parsed
/// package are looked up by relationship id; pictures built in memory carry
/// their bytes.
fn picture_html(pic: &Pic, media: &MediaMap<'_>) -> Option<String> {
    let bytes = media
        .get(pic.id.as_str())
        .copied()
        .or_else(|| (!pic.image.is_empty()).then_some(pic.image.as_slice()))?;
    let mime = image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png");
    let src = ConvertedFile::new(pic.id.clone(), mime, bytes.to_vec()).data_url();
    let (w, h) = pic.size;
    Some(format!(
        "<img src=\"{src}\" width=\"{}\" height=\"{}\" alt=\"\">",
        w / EMU_PER_PX,
        h / EMU_PER_PX
    ))
}

/// Block tag for a paragraph style id (`Heading1`, `Title`, …).
fn block_tag(style: Option<&str>) -> &'static str {
    match style.map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("title" | "heading1") => "h1",
        Some("subtitle" | "heading2") => "h2",
        Some("heading3") => "h3",
        Some("heading4") => "h4",
        Some("heading5") => "h5",
        Some("heading6") => "h6",
        _ => "p",
    }
}

fn run_html(run: &Run, styled: bool, media: &MediaMap<'_>, out: &mut String) {
    if styled {
        for child in &run.children {
            if let RunChild::Drawing(drawing) = child {
                if let Some(DrawingData::Pic(pic)) = &drawing.data {
                    if let Some(img) = picture_html(pic, media) {
                        out.push_str(&img);
                    }
                }
            }
        }
    }
    let mut text = String::new();
    run_text(run, &mut text);
    if text.is_empty() {
        return;
    }
    let mut html = escape_html(&text).replace('\n', "<br>");
    if styled {
        let props = &run.run_property;
        if props.italic.is_some() {
            html = format!("<em>{html}</em>");
        }
        if props.bold.is_some() {
            html = format!("<strong>{html}</strong>");
        }
        if props.underline.is_some() {
            html = format!("<u>{html}</u>");
        }
    }
    out.push_str(&html);
}

fn paragraph_html(para: &Paragraph, styled: bool, media: &MediaMap<'_>, out: &mut String) {
    let tag = if styled {
        block_tag(para.property.style.as_ref().map(|s| s.val.as_str()))
    } else {
        "p"
    };
    out.push_str(&format!("<{tag}>"));
    for child in &para.children {
        match child {
            ParagraphChild::Run(run) => run_html(run, styled, media, out),
            ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let ParagraphChild::Run(run) = inner {
                        run_html(run, styled, media, out);
                    }
                }
            }
            _ => {}
        }
    }
    out.push_str(&format!("</{tag}>\n"));
}

pub(crate) fn to_html(doc: &Docx, styled: bool) -> String {
    let media = if styled { media_map(doc) } else { MediaMap::new() };
    let mut out = String::new();
    for child in &doc.document.children {
        match child {
            DocumentChild::Paragraph(para) => paragraph_html(para, styled, &media, &mut out),
            DocumentChild::Table(table) => {
                out.push_str("<table>\n");
                for row in table_rows(table) {
                    out.push_str("<tr>");
                    for cell in row {
                        out.push_str(&format!("<td>{}</td>", escape_html(&cell).replace('\n', "<br>")));
                    }
                    out.push_str("</tr>\n");
                }
                out.push_str("</table>\n");
            }
            _ => {}
        }
    }
    out
}

#[async_trait]
impl WordMarkup for DocxMarkup {
    async fn extract_raw_text(&self, bytes: Arc<[u8]>) -> Result<String, ConvertError> {
        blocking("DOCX text", move || Ok(raw_text(&parse(&bytes)?))).await
    }

    async fn to_styled_html(&self, bytes: Arc<[u8]>) -> Result<String, ConvertError> {
        blocking("DOCX html", move || Ok(to_html(&parse(&bytes)?, true))).await
    }

    async fn to_plain_html(&self, bytes: Arc<[u8]>) -> Result<String, ConvertError> {
        blocking("DOCX html", move || Ok(to_html(&parse(&bytes)?, false))).await
    }
}

// ── Writer ───────────────────────────────────────────────────────────────

pub(crate) fn build_docx(paragraphs: &[String]) -> Result<Vec<u8>, ConvertError> {
    let docx = paragraphs.iter().fold(Docx::new(), |docx, text| {
        docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
    });
    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| ConvertError::Encode(format!("Failed to write DOCX: {e}")))?;
    let bytes = buf.into_inner();
    debug!("Built DOCX with {} paragraphs ({} bytes)", paragraphs.len(), bytes.len());
    Ok(bytes)
}

#[async_trait]
impl DocxBuilder for DocxWriter {
    async fn build(&self, paragraphs: Vec<String>) -> Result<Vec<u8>, ConvertError> {
        blocking("DOCX build", move || build_docx(&paragraphs)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Arc<[u8]> {
        Arc::from(build_docx(&["Hello world".to_string(), "a < b".to_string()]).unwrap())
    }

    #[tokio::test]
    async fn written_paragraphs_read_back_as_text() {
        let text = DocxMarkup.extract_raw_text(sample()).await.unwrap();
        assert_eq!(text, "Hello world\na < b\n");
    }

    #[tokio::test]
    async fn html_escapes_text() {
        let html = DocxMarkup.to_plain_html(sample()).await.unwrap();
        assert!(html.contains("<p>Hello world</p>"));
        assert!(html.contains("<p>a &lt; b</p>"));
    }

    #[test]
    fn heading_styles_map_to_tags() {
        assert_eq!(block_tag(Some("Heading2")), "h2");
        assert_eq!(block_tag(Some("Title")), "h1");
        assert_eq!(block_tag(Some("Normal")), "p");
        assert_eq!(block_tag(None), "p");
    }

    fn png() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn styled_html_inlines_pictures() {
        let doc = Docx::new().add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text("Logo"))
                .add_run(Run::new().add_image(Pic::new(&png()))),
        );
        let styled = to_html(&doc, true);
        assert!(styled.contains("<img src=\"data:image/png;base64,"), "{styled}");
        assert!(styled.contains("width=\"2\" height=\"2\""), "{styled}");

        let plain = to_html(&doc, false);
        assert!(!plain.contains("<img"), "{plain}");
        assert!(plain.contains("<p>Logo</p>"));
    }

    #[tokio::test]
    async fn garbage_is_a_collaborator_error() {
        let err = DocxMarkup.extract_raw_text(Arc::from(&b"nope"[..])).await;
        assert!(matches!(err, Err(ConvertError::Collaborator(_))));
    }
}
