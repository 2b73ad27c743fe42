//! Spreadsheet pipeline: CSV, XLSX, XLS and ODS, plus PDF export.
//!
//! Tabular targets are a read followed by a write in the target book type.
//! PDF export renders the first sheet as an HTML table, rasterises it and
//! slices the tall image across landscape pages: every page draws the same
//! image shifted up by the height already shown.

use crate::capabilities::{BookType, Capabilities, ImagePlacement, PageOrientation, Workbook};
use crate::config::{ConversionOptions, DEFAULT_SHEET_SCALE};
use crate::error::ConvertError;
use crate::output::ConvertedFile;
use crate::pipeline::encode::encode_surface;
use crate::pipeline::html::SHEET_CSS;
use crate::pipeline::input::{replace_extension, SourceFile};
use crate::progress::{ProgressReporter, STAGE_CONVERTING, STAGE_FINALIZING, STAGE_LOADING};
use crate::registry::{family_of, is_supported, mime_for_extension, Family};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetRoute {
    Book(BookType),
    Pdf,
}

fn route(source: &str, target: &str) -> Option<SheetRoute> {
    if family_of(source) != Some(Family::Spreadsheets) || !is_supported(source, target) {
        return None;
    }
    match target {
        "pdf" => Some(SheetRoute::Pdf),
        other => BookType::from_extension(other).map(SheetRoute::Book),
    }
}

/// Placements that tile an image of `image_px` pixels over pages of
/// `page_mm` millimetres. The image spans the page width; page `n` draws it
/// at `y = -(n × page height)` so that page shows the next slice.
pub fn paginate(image_px: (u32, u32), page_mm: (f32, f32)) -> Vec<ImagePlacement> {
    let (px_w, px_h) = image_px;
    let (page_w, page_h) = page_mm;
    let width = page_w;
    let height = if px_w == 0 {
        0.0
    } else {
        px_h as f32 * page_w / px_w as f32
    };

    let mut placements = vec![ImagePlacement {
        x: 0.0,
        y: 0.0,
        width,
        height,
    }];
    let mut remaining = height - page_h;
    while remaining > 0.0 && page_h > 0.0 {
        placements.push(ImagePlacement {
            x: 0.0,
            y: remaining - height,
            width,
            height,
        });
        remaining -= page_h;
    }
    placements
}

/// Whether `caps` can attempt `source → target` without a missing collaborator.
pub fn check(caps: &Capabilities, source: &str, target: &str) -> Result<(), ConvertError> {
    let chosen = route(source, target).ok_or_else(|| ConvertError::unsupported(source, target))?;
    let codec = caps.spreadsheet_codec()?;
    match chosen {
        SheetRoute::Book(book_type) if !codec.can_write(book_type) => Err(ConvertError::Collaborator(format!(
            "Writing {} workbooks is not supported by the spreadsheet codec",
            book_type.extension().to_uppercase()
        ))),
        SheetRoute::Book(_) => Ok(()),
        SheetRoute::Pdf => {
            caps.html_rasterizer()?;
            caps.image_codec()?;
            caps.pdf_builder().map(|_| ())
        }
    }
}

/// Spreadsheet pipeline entry point.
///
/// Failures are reported as an `Error` progress event here rather than
/// left to the dispatcher.
pub async fn convert(
    caps: &Capabilities,
    source: &SourceFile,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<ConvertedFile, ConvertError> {
    let result = run(caps, source, target, options, progress).await;
    if let Err(e) = &result {
        progress.error(e.to_string());
    }
    result
}

async fn run(
    caps: &Capabilities,
    source: &SourceFile,
    target: &str,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<ConvertedFile, ConvertError> {
    let source_ext = source.extension();
    let chosen = route(&source_ext, target).ok_or_else(|| ConvertError::unsupported(&source_ext, target))?;
    let codec = caps.spreadsheet_codec()?;
    info!("Spreadsheet conversion {} → {target} via {chosen:?}", source.name());

    progress.report(STAGE_LOADING, 0, format!("Loading {}", source.name()));
    let bytes = source.bytes().await?;
    let workbook = codec.read(bytes, &source_ext).await?;
    progress.report(
        STAGE_LOADING,
        25,
        format!("Read {} sheet(s)", workbook.sheets.len()),
    );

    let data = match chosen {
        SheetRoute::Book(book_type) => {
            progress.report(STAGE_CONVERTING, 50, format!("Writing {}", book_type.extension()));
            codec.write(&workbook, book_type).await?
        }
        SheetRoute::Pdf => sheet_to_pdf(caps, &workbook, options, progress).await?,
    };

    progress.complete(format!("Converted to {}", target.to_uppercase()));
    Ok(ConvertedFile::new(
        replace_extension(source.name(), target),
        mime_for_extension(target),
        data,
    ))
}

async fn sheet_to_pdf(
    caps: &Capabilities,
    workbook: &Workbook,
    options: &ConversionOptions,
    progress: &ProgressReporter<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let sheet = workbook
        .sheets
        .first()
        .ok_or_else(|| ConvertError::Collaborator("Workbook contains no sheets".into()))?;
    let codec = caps.spreadsheet_codec()?;
    let rasterizer = caps.html_rasterizer()?;
    let image_codec = caps.image_codec()?;
    let builder = caps.pdf_builder()?;

    let table = codec.sheet_to_html(sheet);
    let fragment = format!("<div class=\"sheet\"><style>{SHEET_CSS}</style>{table}</div>");
    let scale = options.quality_or(DEFAULT_SHEET_SCALE);
    progress.report(STAGE_CONVERTING, 40, format!("Rendering sheet '{}'", sheet.name));
    let raster = rasterizer.rasterize(fragment, scale).await?;
    let dimensions = raster.dimensions();
    let png = encode_surface(&**image_codec, raster, "png", 1.0).await?;

    let mut writer = builder.create(PageOrientation::Landscape);
    let placements = paginate(dimensions, writer.page_size());
    debug!("Sheet image {}x{} over {} page(s)", dimensions.0, dimensions.1, placements.len());
    progress.report(STAGE_FINALIZING, 70, format!("Laying out {} page(s)", placements.len()));
    for (i, placement) in placements.iter().enumerate() {
        if i > 0 {
            writer.add_page();
        }
        writer.add_png(&png, *placement)?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4_LANDSCAPE: (f32, f32) = (297.0, 210.0);

    #[test]
    fn short_image_fits_one_page() {
        let pages = paginate((1188, 400), A4_LANDSCAPE);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].y, 0.0);
        assert_eq!(pages[0].width, 297.0);
        assert_eq!(pages[0].height, 100.0);
    }

    #[test]
    fn tall_image_uses_running_negative_offset() {
        // 297mm wide, 500mm tall.
        let pages = paginate((297, 500), A4_LANDSCAPE);
        let offsets: Vec<f32> = pages.iter().map(|p| p.y).collect();
        assert_eq!(offsets, vec![0.0, -210.0, -420.0]);
    }

    #[test]
    fn exact_multiple_has_no_blank_trailing_page() {
        let pages = paginate((297, 420), A4_LANDSCAPE);
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn routes() {
        assert_eq!(route("csv", "xlsx"), Some(SheetRoute::Book(BookType::Xlsx)));
        assert_eq!(route("ods", "pdf"), Some(SheetRoute::Pdf));
        assert_eq!(route("csv", "csv"), None);
        assert_eq!(route("pdf", "csv"), None);
    }
}
