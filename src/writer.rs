use crate::archive::build_archive;
use crate::layout::LayoutConfig;
use crate::package::{build_parts, ExportReport};
use crate::types::{ImagePlacement, SheetData, WriteError};
use crate::validation::{validate_export, validate_output_path, write_bytes_atomic};
use chrono::{DateTime, Utc};

pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Overrides the sheet's own name when set.
    pub sheet_name: Option<String>,
    pub layout: LayoutConfig,
    /// Abort on the first undecodable image instead of skipping it.
    pub strict_images: bool,
    /// Timestamp written to the document properties; `None` means now.
    pub created: Option<DateTime<Utc>>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            sheet_name: None,
            layout: LayoutConfig::default(),
            strict_images: false,
            created: None,
        }
    }
}

impl ExportOptions {
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = Some(name.into());
        self
    }
}

/// An in-memory file with its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

/// `sheet` under the name `options` asks for, if any.
pub(crate) fn named_sheet<'a>(
    sheet: &'a SheetData,
    options: &ExportOptions,
) -> std::borrow::Cow<'a, SheetData> {
    match &options.sheet_name {
        Some(name) if *name != sheet.name => std::borrow::Cow::Owned(SheetData {
            name: name.clone(),
            rows: sheet.rows.clone(),
        }),
        _ => std::borrow::Cow::Borrowed(sheet),
    }
}

fn build_checked(
    sheet: &SheetData,
    images: &[ImagePlacement],
    options: &ExportOptions,
) -> Result<(Blob, ExportReport), WriteError> {
    let parts = build_parts(sheet, images, options)?;
    let mut report = parts.report;
    let bytes = build_archive(&parts.entries)?;
    report.bytes = bytes.len();

    Ok((
        Blob {
            media_type: XLSX_MEDIA_TYPE,
            bytes,
        },
        report,
    ))
}

/// Encode a grid and its pictures into XLSX bytes.
pub fn build_xlsx(
    sheet: &SheetData,
    images: &[ImagePlacement],
    options: &ExportOptions,
) -> Result<(Blob, ExportReport), WriteError> {
    let sheet = named_sheet(sheet, options);
    validate_export(&sheet, &options.layout).to_error()?;
    build_checked(&sheet, images, options)
}

/// Encode and write to `filename`. Preconditions are checked before any work and the
/// file only appears once it is complete.
pub fn export_container(
    sheet: &SheetData,
    images: &[ImagePlacement],
    filename: &str,
    options: &ExportOptions,
) -> Result<ExportReport, WriteError> {
    let sheet = named_sheet(sheet, options);
    validate_export(&sheet, &options.layout).to_error()?;
    validate_output_path(filename)?;

    let (blob, report) = build_checked(&sheet, images, options)?;
    write_bytes_atomic(filename, &blob.bytes)?;

    log::info!(
        "wrote {} ({} bytes, {} images, {} skipped)",
        filename,
        report.bytes,
        report.images_embedded,
        report.skipped_images.len()
    );
    Ok(report)
}
