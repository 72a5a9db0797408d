//! File-level export: format dispatch, naming, the XLSX-to-HTML fallback and the
//! single-flight [`Exporter`].
use crate::dataset::Dataset;
use crate::fallback::{to_csv, to_html_table};
use crate::package::ExportReport;
use crate::resolve::{resolve_sources, ImageFetcher, SourceFetcher};
use crate::types::{ImagePlacement, SheetData, WriteError};
use crate::validation::write_bytes_atomic;
use crate::writer::{export_container, named_sheet, ExportOptions, XLSX_MEDIA_TYPE};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

/// Extension used when an HTML table stands in for a workbook.
pub const FALLBACK_EXTENSION: &str = "xls";
pub const FALLBACK_MEDIA_TYPE: &str = "application/vnd.ms-excel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Html,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv;charset=utf-8",
            ExportFormat::Html => "text/html;charset=utf-8",
            ExportFormat::Xlsx => XLSX_MEDIA_TYPE,
        }
    }
}

#[derive(Debug)]
pub enum ExportError {
    Write(WriteError),
    /// Another export on the same [`Exporter`] has not finished yet.
    Busy,
    Json(serde_json::Error),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExportError::Write(e) => write!(f, "{}", e),
            ExportError::Busy => write!(f, "An export is already in progress"),
            ExportError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Write(e) => Some(e),
            ExportError::Json(e) => Some(e),
            ExportError::Busy => None,
        }
    }
}

impl From<WriteError> for ExportError {
    fn from(e: WriteError) -> Self {
        ExportError::Write(e)
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Write(WriteError::Io(e))
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Json(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub path: PathBuf,
    /// Format actually written.
    pub format: ExportFormat,
    pub fell_back: bool,
    pub fallback_reason: Option<String>,
    /// Present for XLSX output only.
    pub report: Option<ExportReport>,
}

impl ExportOutcome {
    pub fn media_type(&self) -> &'static str {
        if self.fell_back {
            FALLBACK_MEDIA_TYPE
        } else {
            self.format.media_type()
        }
    }
}

fn sanitize_component(s: &str) -> String {
    let cleaned: String = s
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned
    }
}

/// `<prefix>-<keyword>-<timestamp>.<ext>` with the timestamp in RFC 3339 millis, `:` and
/// `.` turned into `-`.
pub fn export_filename(
    prefix: &str,
    keyword: &str,
    timestamp: DateTime<Utc>,
    format: ExportFormat,
) -> String {
    let ts = timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(|c: char| c == ':' || c == '.', "-");
    format!(
        "{}-{}-{}.{}",
        sanitize_component(prefix),
        sanitize_component(keyword),
        ts,
        format.extension()
    )
}

fn path_str(path: &Path) -> Result<&str, WriteError> {
    path.to_str().ok_or_else(|| {
        WriteError::Validation(format!("Output path is not valid UTF-8: {}", path.display()))
    })
}

fn write_html(sheet: &SheetData, images: &[ImagePlacement], path: &Path) -> Result<(), WriteError> {
    write_bytes_atomic(path_str(path)?, to_html_table(sheet, images).as_bytes())
}

/// Write `sheet` in `format` to `path`. A workbook that cannot be built for any reason
/// other than I/O is replaced by the HTML table, saved next to it with an `.xls` extension.
/// `options.sheet_name` names the sheet in every format.
pub fn export_sheet(
    sheet: &SheetData,
    images: &[ImagePlacement],
    format: ExportFormat,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportOutcome, ExportError> {
    let outcome = |path: &Path, format: ExportFormat, report: Option<ExportReport>| ExportOutcome {
        path: path.to_path_buf(),
        format,
        fell_back: false,
        fallback_reason: None,
        report,
    };
    let named = named_sheet(sheet, options);
    let sheet: &SheetData = &named;

    match format {
        ExportFormat::Csv => {
            write_bytes_atomic(path_str(path)?, to_csv(sheet).as_bytes())?;
            Ok(outcome(path, format, None))
        }
        ExportFormat::Html => {
            write_html(sheet, images, path)?;
            Ok(outcome(path, format, None))
        }
        ExportFormat::Xlsx => match export_container(sheet, images, path_str(path)?, options) {
            Ok(report) => Ok(outcome(path, format, Some(report))),
            Err(WriteError::Io(e)) => Err(ExportError::Write(WriteError::Io(e))),
            Err(e) => {
                let fallback = path.with_extension(FALLBACK_EXTENSION);
                log::warn!(
                    "workbook export failed ({}); writing HTML table to {}",
                    e,
                    fallback.display()
                );
                write_html(sheet, images, &fallback)?;
                Ok(ExportOutcome {
                    path: fallback,
                    format: ExportFormat::Html,
                    fell_back: true,
                    fallback_reason: Some(e.to_string()),
                    report: None,
                })
            }
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    Started { keyword: String, products: usize },
    Resolved { images: usize, unresolved: usize },
    Finished { path: PathBuf, format: ExportFormat },
    FellBack { path: PathBuf, reason: String },
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs dataset exports one at a time and reports progress on an optional channel.
pub struct Exporter {
    options: ExportOptions,
    prefix: String,
    fetcher: Box<dyn ImageFetcher>,
    events: Option<Sender<ExportEvent>>,
    busy: AtomicBool,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            prefix: "products".to_string(),
            fetcher: Box::new(SourceFetcher::new()),
            events: None,
            busy: AtomicBool::new(false),
        }
    }

    pub fn with_events(mut self, sender: Sender<ExportEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl ImageFetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn emit(&self, event: ExportEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = tx.send(event);
        }
    }

    /// Export `dataset` into `out_dir` under a generated name.
    pub fn export(
        &self,
        dataset: &Dataset,
        format: ExportFormat,
        out_dir: &Path,
    ) -> Result<ExportOutcome, ExportError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or(ExportError::Busy)?;

        log::info!(
            "exporting {} products for '{}' as {}",
            dataset.products.len(),
            dataset.keyword,
            format.extension()
        );
        self.emit(ExportEvent::Started {
            keyword: dataset.keyword.clone(),
            products: dataset.products.len(),
        });

        let (sheet, images) = dataset.to_sheet(&self.options.layout);
        let images = if format == ExportFormat::Xlsx {
            resolve_sources(&images, &*self.fetcher)
        } else {
            images
        };
        let unresolved = images.iter().filter(|img| !img.is_data_url()).count();
        self.emit(ExportEvent::Resolved {
            images: images.len(),
            unresolved,
        });

        let stamp = self.options.created.unwrap_or_else(Utc::now);
        let path = out_dir.join(export_filename(&self.prefix, &dataset.keyword, stamp, format));
        let outcome = export_sheet(&sheet, &images, format, &path, &self.options)?;

        match &outcome.fallback_reason {
            Some(reason) => self.emit(ExportEvent::FellBack {
                path: outcome.path.clone(),
                reason: reason.clone(),
            }),
            None => self.emit(ExportEvent::Finished {
                path: outcome.path.clone(),
                format: outcome.format,
            }),
        }
        Ok(outcome)
    }
}
