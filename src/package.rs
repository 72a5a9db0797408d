//! Assembles the full OPC part set for a one-sheet workbook with pictures.
use crate::media::{parse_data_url, DecodedImage, ImageKind};
use crate::types::{ArchiveEntry, ImagePlacement, SheetData, WriteError};
use crate::validation::{validate_cell_coords, validate_grid_size};
use crate::writer::ExportOptions;
use crate::xml::{self, DrawingAnchor, MediaRef};
use rayon::prelude::*;

/// Anchors never land on the header row or the index column.
pub const MIN_ANCHOR_ROW: u32 = 2;
pub const MIN_ANCHOR_COL: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub index: usize,
    pub reason: String,
}

/// What went into a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub entries: usize,
    pub images_embedded: usize,
    pub skipped_images: Vec<SkippedImage>,
    /// Archive size; zero until the container has been built.
    pub bytes: usize,
}

#[derive(Debug)]
pub struct PackageParts {
    pub entries: Vec<ArchiveEntry>,
    pub report: ExportReport,
}

struct EmbeddedImage {
    anchor: DrawingAnchor,
    media: MediaRef,
    bytes: Vec<u8>,
}

fn decode_image(index: usize, placement: &ImagePlacement) -> Result<DecodedImage, WriteError> {
    let context = format!("image #{}", index);
    validate_cell_coords(
        placement.row.max(MIN_ANCHOR_ROW),
        placement.col.max(MIN_ANCHOR_COL),
        &context,
    )
    .and_then(|_| parse_data_url(&placement.source))
    .map_err(|reason| WriteError::InvalidImage { index, reason })
}

/// Decode every placement and keep the ones that survive, numbering media in embed order.
fn embed_images(
    images: &[ImagePlacement],
    options: &ExportOptions,
    report: &mut ExportReport,
) -> Result<Vec<EmbeddedImage>, WriteError> {
    let decoded: Vec<Result<DecodedImage, WriteError>> = images
        .par_iter()
        .enumerate()
        .map(|(index, placement)| decode_image(index, placement))
        .collect();

    let mut embedded = Vec::with_capacity(images.len());
    for (placement, result) in images.iter().zip(decoded) {
        let image = match result {
            Ok(image) => image,
            Err(err) if options.strict_images => return Err(err),
            Err(WriteError::InvalidImage { index, reason }) => {
                log::warn!("skipping image #{} at row {}: {}", index, placement.row, reason);
                report.skipped_images.push(SkippedImage { index, reason });
                continue;
            }
            Err(err) => return Err(err),
        };

        let media_idx = embedded.len() + 1;
        let default_px = options.layout.thumbnail_px;
        embedded.push(EmbeddedImage {
            anchor: DrawingAnchor {
                row: placement.row.max(MIN_ANCHOR_ROW),
                col: placement.col.max(MIN_ANCHOR_COL),
                width_px: placement.width_px.unwrap_or(default_px),
                height_px: placement.height_px.unwrap_or(default_px),
                media_idx,
            },
            media: MediaRef { idx: media_idx, kind: image.kind },
            bytes: image.bytes,
        });
    }

    report.images_embedded = embedded.len();
    Ok(embedded)
}

/// Render every part of the package, in archive order. Grids beyond the sheet limits are
/// rejected before anything is rendered.
pub fn build_parts(
    sheet: &SheetData,
    images: &[ImagePlacement],
    options: &ExportOptions,
) -> Result<PackageParts, WriteError> {
    validate_grid_size(sheet.num_rows(), sheet.num_cols()).map_err(WriteError::Validation)?;

    let mut report = ExportReport::default();
    let embedded = embed_images(images, options, &mut report)?;

    let anchors: Vec<DrawingAnchor> = embedded.iter().map(|e| e.anchor.clone()).collect();
    let media: Vec<MediaRef> = embedded.iter().map(|e| e.media.clone()).collect();
    let kinds: Vec<ImageKind> = media.iter().map(|m| m.kind).collect();
    let created = options.created.unwrap_or_else(chrono::Utc::now);

    let mut entries = Vec::with_capacity(10 + embedded.len());
    entries.push(ArchiveEntry::new(
        "[Content_Types].xml",
        xml::generate_content_types(&kinds).into_bytes(),
    ));
    entries.push(ArchiveEntry::new("_rels/.rels", xml::generate_rels().into_bytes()));
    entries.push(ArchiveEntry::new(
        "docProps/core.xml",
        xml::generate_core_xml(created).into_bytes(),
    ));
    entries.push(ArchiveEntry::new("docProps/app.xml", xml::generate_app_xml().into_bytes()));
    entries.push(ArchiveEntry::new(
        "xl/workbook.xml",
        xml::generate_workbook(&sheet.name).into_bytes(),
    ));
    entries.push(ArchiveEntry::new(
        "xl/_rels/workbook.xml.rels",
        xml::generate_workbook_rels().into_bytes(),
    ));
    entries.push(ArchiveEntry::new(
        "xl/worksheets/sheet1.xml",
        xml::generate_sheet_xml(sheet, &options.layout),
    ));
    entries.push(ArchiveEntry::new(
        "xl/worksheets/_rels/sheet1.xml.rels",
        xml::generate_worksheet_rels().into_bytes(),
    ));
    entries.push(ArchiveEntry::new(
        "xl/drawings/drawing1.xml",
        xml::generate_drawing(&anchors).into_bytes(),
    ));
    entries.push(ArchiveEntry::new(
        "xl/drawings/_rels/drawing1.xml.rels",
        xml::generate_drawing_rels(&media).into_bytes(),
    ));

    for image in embedded {
        entries.push(ArchiveEntry::new(
            format!("xl/media/{}", image.media.file_name()),
            image.bytes,
        ));
    }

    report.entries = entries.len();
    log::debug!(
        "package parts: {} entries, {} images embedded, {} skipped",
        report.entries,
        report.images_embedded,
        report.skipped_images.len()
    );
    Ok(PackageParts { entries, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::{JPEG_HEAD, PNG_1X1};
    use crate::media::to_data_url;

    fn grid() -> SheetData {
        SheetData::from_rows("Sheet1", vec![vec!["No.", "Cover"], vec!["1", ""], vec!["2", ""]])
    }

    fn paths(parts: &PackageParts) -> Vec<&str> {
        parts.entries.iter().map(|e| e.path.as_str()).collect()
    }

    fn entry<'a>(parts: &'a PackageParts, path: &str) -> &'a str {
        let e = parts.entries.iter().find(|e| e.path == path).unwrap();
        std::str::from_utf8(&e.bytes).unwrap()
    }

    #[test]
    fn test_fixed_parts_without_images() {
        let parts = build_parts(&grid(), &[], &ExportOptions::default()).unwrap();
        assert_eq!(
            paths(&parts),
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "docProps/core.xml",
                "docProps/app.xml",
                "xl/workbook.xml",
                "xl/_rels/workbook.xml.rels",
                "xl/worksheets/sheet1.xml",
                "xl/worksheets/_rels/sheet1.xml.rels",
                "xl/drawings/drawing1.xml",
                "xl/drawings/_rels/drawing1.xml.rels",
            ]
        );
        assert_eq!(parts.report.entries, 10);
        assert_eq!(parts.report.images_embedded, 0);
        assert!(!entry(&parts, "xl/drawings/drawing1.xml").contains("oneCellAnchor"));
    }

    #[test]
    fn test_media_numbered_sequentially_by_kind() {
        let images = vec![
            ImagePlacement::new(2, 2, to_data_url("image/png", PNG_1X1)),
            ImagePlacement::new(3, 2, to_data_url("image/jpeg", JPEG_HEAD)),
        ];
        let parts = build_parts(&grid(), &images, &ExportOptions::default()).unwrap();
        let p = paths(&parts);
        assert!(p.contains(&"xl/media/image1.png"));
        assert!(p.contains(&"xl/media/image2.jpg"));

        let rels = entry(&parts, "xl/drawings/_rels/drawing1.xml.rels");
        assert!(rels.contains("Target=\"../media/image2.jpg\""));
        let types = entry(&parts, "[Content_Types].xml");
        assert!(types.contains("Extension=\"jpg\""));
        assert!(types.contains("Extension=\"png\""));
    }

    #[test]
    fn test_bad_image_skipped_in_lenient_mode() {
        let images = vec![
            ImagePlacement::new(2, 2, "data:image/png;base64,!!!"),
            ImagePlacement::new(3, 2, to_data_url("image/png", PNG_1X1)),
        ];
        let parts = build_parts(&grid(), &images, &ExportOptions::default()).unwrap();
        assert_eq!(parts.report.images_embedded, 1);
        assert_eq!(parts.report.skipped_images.len(), 1);
        assert_eq!(parts.report.skipped_images[0].index, 0);
        assert!(paths(&parts).contains(&"xl/media/image1.png"));

        let drawing = entry(&parts, "xl/drawings/drawing1.xml");
        assert!(drawing.contains("<xdr:row>2</xdr:row>"));
    }

    #[test]
    fn test_bad_image_aborts_in_strict_mode() {
        let images = vec![
            ImagePlacement::new(2, 2, to_data_url("image/png", PNG_1X1)),
            ImagePlacement::new(3, 2, "https://example.com/a.png"),
        ];
        let options = ExportOptions {
            strict_images: true,
            ..ExportOptions::default()
        };
        match build_parts(&grid(), &images, &options) {
            Err(WriteError::InvalidImage { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected invalid image, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_anchor_is_skipped() {
        let images = vec![ImagePlacement::new(2, 20_000, to_data_url("image/png", PNG_1X1))];
        let parts = build_parts(&grid(), &images, &ExportOptions::default()).unwrap();
        assert_eq!(parts.report.images_embedded, 0);
        assert!(parts.report.skipped_images[0].reason.contains("Column 20000"));
    }

    #[test]
    fn test_oversized_grid_rejected_before_rendering() {
        let wide = SheetData::from_rows("Sheet1", vec![vec!["x"; 16_385]]);
        match build_parts(&wide, &[], &ExportOptions::default()) {
            Err(WriteError::Validation(msg)) => assert!(msg.contains("16385")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let widest = SheetData::from_rows("Sheet1", vec![vec!["x"; 16_384]]);
        let parts = build_parts(&widest, &[], &ExportOptions::default()).unwrap();
        assert!(entry(&parts, "xl/worksheets/sheet1.xml").contains("<c r=\"XFD1\""));
    }

    #[test]
    fn test_anchor_clamped_and_sized() {
        let images = vec![ImagePlacement::new(1, 1, to_data_url("image/png", PNG_1X1)).with_size(40, 30)];
        let parts = build_parts(&grid(), &images, &ExportOptions::default()).unwrap();
        let drawing = entry(&parts, "xl/drawings/drawing1.xml");
        assert!(drawing.contains("<xdr:col>1</xdr:col>"));
        assert!(drawing.contains("<xdr:row>1</xdr:row>"));
        assert!(drawing.contains("cx=\"381000\" cy=\"285750\""));
    }
}
