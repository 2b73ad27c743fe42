//! Collaborator traits and the [`Capabilities`] bundle that wires them.
//!
//! The conversion core owns no codec. Each external capability (image
//! decode/encode, PDF text and rasterisation, transcoding, archive and
//! spreadsheet codecs, HTML rendering) is a trait object the caller hands in
//! through [`Capabilities`]. [`Capabilities::native()`] fills every slot that
//! has a pure-Rust or command-line implementation in [`crate::native`];
//! the rest stay empty until the caller injects one, and a pipeline that
//! needs an empty slot fails with [`ConvertError::CapabilityUnavailable`].
//!
//! Traits with per-call mutable state (tar and PDF page builders) hand out
//! boxed builders instead of taking `&mut self`, so one `Capabilities` can
//! be shared by concurrent conversions.

use crate::error::ConvertError;
use async_trait::async_trait;
use image::RgbaImage;
use std::fmt;
use std::sync::Arc;

// ── Images ───────────────────────────────────────────────────────────────

/// Decode encoded images to RGBA surfaces and encode surfaces back.
#[async_trait]
pub trait ImageCodec: Send + Sync {
    async fn decode(&self, bytes: Arc<[u8]>) -> Result<RgbaImage, ConvertError>;

    /// Encode `surface` as `extension`. `Ok(None)` means the encoder ran but
    /// produced nothing.
    async fn encode(
        &self,
        surface: RgbaImage,
        extension: &str,
        quality: f32,
    ) -> Result<Option<Vec<u8>>, ConvertError>;
}

/// Rasterise SVG markup at its natural size.
#[async_trait]
pub trait SvgRasterizer: Send + Sync {
    async fn rasterize(&self, svg: Arc<[u8]>) -> Result<RgbaImage, ConvertError>;
}

/// Decode HEIC/HEIF containers into encoded frames of `mime_type`.
#[async_trait]
pub trait HeicDecoder: Send + Sync {
    async fn decode(
        &self,
        bytes: Arc<[u8]>,
        mime_type: &str,
        quality: f32,
    ) -> Result<Vec<Vec<u8>>, ConvertError>;
}

/// What the general-purpose image engine made of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagickOutcome {
    Converted(Vec<u8>),
    /// The engine ran and declined, with its own message.
    Rejected(String),
}

/// General-purpose image conversion engine used as the raster fallback.
#[async_trait]
pub trait ImageMagick: Send + Sync {
    async fn convert(
        &self,
        bytes: Arc<[u8]>,
        source_extension: &str,
        target_extension: &str,
    ) -> Result<MagickOutcome, ConvertError>;
}

// ── Documents ────────────────────────────────────────────────────────────

/// One run of text on a PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
    /// The engine reports this fragment as ending a line.
    pub has_eol: bool,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, has_eol: bool) -> Self {
        Self {
            text: text.into(),
            has_eol,
        }
    }
}

/// Opens PDFs.
#[async_trait]
pub trait PdfEngine: Send + Sync {
    async fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PdfDocument>, ConvertError>;
}

/// An opened PDF. Pages are 1-based.
#[async_trait]
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;
    async fn page_text(&self, page: usize) -> Result<Vec<TextFragment>, ConvertError>;
    async fn render_page(&self, page: usize, scale: f32) -> Result<RgbaImage, ConvertError>;
}

/// Word-processing markup (DOCX/DOC) conversions.
#[async_trait]
pub trait WordMarkup: Send + Sync {
    async fn extract_raw_text(&self, bytes: Arc<[u8]>) -> Result<String, ConvertError>;
    /// HTML with heading/table/emphasis styles and inline images as data URIs.
    async fn to_styled_html(&self, bytes: Arc<[u8]>) -> Result<String, ConvertError>;
    /// HTML without any style mapping.
    async fn to_plain_html(&self, bytes: Arc<[u8]>) -> Result<String, ConvertError>;
}

/// Builds a binary DOCX from plain paragraphs.
#[async_trait]
pub trait DocxBuilder: Send + Sync {
    async fn build(&self, paragraphs: Vec<String>) -> Result<Vec<u8>, ConvertError>;
}

/// Which HTML-to-PDF path to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlRenderMode {
    /// Full renderer honouring the document's styles.
    Styled,
    /// Simpler rasterise-then-embed path.
    Canvas,
}

#[async_trait]
pub trait HtmlPdfRenderer: Send + Sync {
    async fn render(&self, html: String, mode: HtmlRenderMode) -> Result<Vec<u8>, ConvertError>;
}

/// Rasterise an HTML fragment (not a full page) at `scale`.
#[async_trait]
pub trait HtmlRasterizer: Send + Sync {
    async fn rasterize(&self, html: String, scale: f32) -> Result<RgbaImage, ConvertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrientation {
    Portrait,
    Landscape,
}

/// Where to draw an image on a PDF page, in millimetres from the top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Hands out PDF page builders.
pub trait PdfBuilder: Send + Sync {
    fn create(&self, orientation: PageOrientation) -> Box<dyn PdfPageWriter>;
}

/// A PDF under construction. The first page exists from creation.
pub trait PdfPageWriter: Send {
    /// Page width and height in millimetres.
    fn page_size(&self) -> (f32, f32);
    fn add_page(&mut self);
    fn add_png(&mut self, png: &[u8], placement: ImagePlacement) -> Result<(), ConvertError>;
    fn finish(self: Box<Self>) -> Result<Vec<u8>, ConvertError>;
}

// ── Media ────────────────────────────────────────────────────────────────

/// A transcoding engine with its own virtual filesystem.
///
/// A session starts with [`Transcoder::load`] and ends with
/// [`Transcoder::terminate`]; `load` after `terminate` starts a new one.
#[async_trait]
pub trait Transcoder: Send + Sync {
    fn is_loaded(&self) -> bool;
    async fn load(&self) -> Result<(), ConvertError>;
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), ConvertError>;
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, ConvertError>;
    async fn delete_file(&self, name: &str) -> Result<(), ConvertError>;
    /// Run a command. `on_ratio` receives completion in 0.0–1.0.
    async fn exec(
        &self,
        args: &[String],
        on_ratio: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), ConvertError>;
    async fn terminate(&self);
}

// ── Archives ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub is_dir: bool,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn file(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            data,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            data: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Entries in archive listing order.
    async fn read_zip(&self, bytes: Arc<[u8]>) -> Result<Vec<ArchiveEntry>, ConvertError>;
    async fn write_zip(&self, entries: Vec<ArchiveEntry>) -> Result<Vec<u8>, ConvertError>;
    fn tar_builder(&self) -> Box<dyn TarBuilder>;
    async fn gzip(&self, data: Vec<u8>) -> Result<Vec<u8>, ConvertError>;
    async fn gunzip(&self, bytes: Arc<[u8]>) -> Result<Vec<u8>, ConvertError>;
}

pub trait TarBuilder: Send {
    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), ConvertError>;
    fn finish(self: Box<Self>) -> Result<Vec<u8>, ConvertError>;
}

// ── Spreadsheets ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Worksheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
}

/// Output mode for [`SpreadsheetCodec::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookType {
    Csv,
    Xlsx,
    Xls,
    Ods,
}

impl BookType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "csv" => Some(BookType::Csv),
            "xlsx" => Some(BookType::Xlsx),
            "xls" => Some(BookType::Xls),
            "ods" => Some(BookType::Ods),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            BookType::Csv => "csv",
            BookType::Xlsx => "xlsx",
            BookType::Xls => "xls",
            BookType::Ods => "ods",
        }
    }
}

#[async_trait]
pub trait SpreadsheetCodec: Send + Sync {
    async fn read(&self, bytes: Arc<[u8]>, extension: &str) -> Result<Workbook, ConvertError>;
    async fn write(&self, workbook: &Workbook, book_type: BookType) -> Result<Vec<u8>, ConvertError>;
    fn sheet_to_html(&self, sheet: &Worksheet) -> String;

    /// Whether [`SpreadsheetCodec::write`] supports `book_type`.
    fn can_write(&self, _book_type: BookType) -> bool {
        true
    }
}

// ── Bundle ───────────────────────────────────────────────────────────────

/// The collaborators available to the pipelines.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub image_codec: Option<Arc<dyn ImageCodec>>,
    pub svg_rasterizer: Option<Arc<dyn SvgRasterizer>>,
    pub heic_decoder: Option<Arc<dyn HeicDecoder>>,
    pub image_magick: Option<Arc<dyn ImageMagick>>,
    pub pdf_engine: Option<Arc<dyn PdfEngine>>,
    pub word_markup: Option<Arc<dyn WordMarkup>>,
    pub docx_builder: Option<Arc<dyn DocxBuilder>>,
    pub html_pdf: Option<Arc<dyn HtmlPdfRenderer>>,
    pub html_rasterizer: Option<Arc<dyn HtmlRasterizer>>,
    pub pdf_builder: Option<Arc<dyn PdfBuilder>>,
    pub transcoder: Option<Arc<dyn Transcoder>>,
    pub archive_codec: Option<Arc<dyn ArchiveCodec>>,
    pub spreadsheet_codec: Option<Arc<dyn SpreadsheetCodec>>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = |present: bool| if present { "<configured>" } else { "<none>" };
        f.debug_struct("Capabilities")
            .field("image_codec", &slot(self.image_codec.is_some()))
            .field("svg_rasterizer", &slot(self.svg_rasterizer.is_some()))
            .field("heic_decoder", &slot(self.heic_decoder.is_some()))
            .field("image_magick", &slot(self.image_magick.is_some()))
            .field("pdf_engine", &slot(self.pdf_engine.is_some()))
            .field("word_markup", &slot(self.word_markup.is_some()))
            .field("docx_builder", &slot(self.docx_builder.is_some()))
            .field("html_pdf", &slot(self.html_pdf.is_some()))
            .field("html_rasterizer", &slot(self.html_rasterizer.is_some()))
            .field("pdf_builder", &slot(self.pdf_builder.is_some()))
            .field("transcoder", &slot(self.transcoder.is_some()))
            .field("archive_codec", &slot(self.archive_codec.is_some()))
            .field("spreadsheet_codec", &slot(self.spreadsheet_codec.is_some()))
            .finish()
    }
}

macro_rules! capability_accessors {
    ($($field:ident, $with:ident, $trait_:ident, $label:literal;)*) => {
        impl Capabilities {
            $(
                pub fn $with(mut self, value: Arc<dyn $trait_>) -> Self {
                    self.$field = Some(value);
                    self
                }

                pub fn $field(&self) -> Result<&Arc<dyn $trait_>, ConvertError> {
                    self.$field.as_ref().ok_or_else(|| ConvertError::missing($label))
                }
            )*
        }
    };
}

capability_accessors! {
    image_codec, with_image_codec, ImageCodec, "Image codec";
    svg_rasterizer, with_svg_rasterizer, SvgRasterizer, "SVG rasterizer";
    heic_decoder, with_heic_decoder, HeicDecoder, "HEIC decoder";
    image_magick, with_image_magick, ImageMagick, "ImageMagick";
    pdf_engine, with_pdf_engine, PdfEngine, "PDF engine";
    word_markup, with_word_markup, WordMarkup, "Word markup converter";
    docx_builder, with_docx_builder, DocxBuilder, "DOCX builder";
    html_pdf, with_html_pdf, HtmlPdfRenderer, "HTML-to-PDF renderer";
    html_rasterizer, with_html_rasterizer, HtmlRasterizer, "HTML rasterizer";
    pdf_builder, with_pdf_builder, PdfBuilder, "PDF builder";
    transcoder, with_transcoder, Transcoder, "FFmpeg";
    archive_codec, with_archive_codec, ArchiveCodec, "Archive codec";
    spreadsheet_codec, with_spreadsheet_codec, SpreadsheetCodec, "Spreadsheet codec";
}

impl Capabilities {
    /// An empty bundle; every pipeline fails until slots are filled.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every collaborator with a native implementation.
    pub fn native() -> Self {
        let caps = Self::none()
            .with_image_codec(Arc::new(crate::native::ImageCrateCodec))
            .with_image_magick(Arc::new(crate::native::MagickCli::from_env()))
            .with_pdf_engine(Arc::new(crate::native::PdfiumEngine))
            .with_word_markup(Arc::new(crate::native::DocxMarkup))
            .with_docx_builder(Arc::new(crate::native::DocxWriter))
            .with_transcoder(Arc::new(crate::native::FfmpegTranscoder::from_env()))
            .with_archive_codec(Arc::new(crate::native::NativeArchiveCodec))
            .with_spreadsheet_codec(Arc::new(crate::native::CalamineCodec));
        #[cfg(feature = "svg")]
        let caps = caps.with_svg_rasterizer(Arc::new(crate::native::ResvgRasterizer));
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_reports_capability_name() {
        let caps = Capabilities::none();
        let err = caps.heic_decoder().err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("HEIC decoder is not available"));
        let err = caps.transcoder().err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("FFmpeg is not available"));
    }

    #[test]
    fn native_fills_codec_slots() {
        let caps = Capabilities::native();
        assert!(caps.image_codec().is_ok());
        assert!(caps.archive_codec().is_ok());
        assert!(caps.spreadsheet_codec().is_ok());
        assert!(caps.html_pdf().is_err());
        let debug = format!("{caps:?}");
        assert!(debug.contains("image_codec: \"<configured>\""), "got: {debug}");
    }

    #[test]
    fn book_type_extensions() {
        for ext in ["csv", "xlsx", "xls", "ods"] {
            assert_eq!(BookType::from_extension(ext).map(|b| b.extension()), Some(ext));
        }
        assert_eq!(BookType::from_extension("pdf"), None);
    }
}
