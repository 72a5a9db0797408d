//! Spreadsheet exports with embedded thumbnails.
//!
//! The core builds a single-sheet XLSX package by hand: inline-string cells, one drawing
//! with a picture anchored per image, and a store-only ZIP container. Around it sit the
//! CSV and HTML renditions, product-listing cleanup and a single-flight exporter.

pub mod archive;
pub mod crc;
pub mod dataset;
pub mod export;
pub mod fallback;
pub mod layout;
pub mod media;
pub mod package;
pub mod resolve;
pub mod types;
pub mod validation;
pub mod writer;
pub mod xml;

pub use dataset::{clean_value, Dataset, FieldKind, HeaderLabels, Product};
pub use export::{export_filename, export_sheet, ExportError, ExportEvent, ExportFormat, ExportOutcome, Exporter};
pub use layout::LayoutConfig;
pub use package::{ExportReport, SkippedImage};
pub use resolve::{resolve_sources, HttpFetcher, ImageFetcher, LocalFetcher, SourceFetcher};
pub use types::{ArchiveEntry, ImagePlacement, SheetData, WriteError};
pub use writer::{build_xlsx, export_container, Blob, ExportOptions, XLSX_MEDIA_TYPE};
