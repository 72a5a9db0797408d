/// Pre-write checks and safe output for thumbxl
use crate::layout::LayoutConfig;
use crate::types::{SheetData, WriteError};
use std::fs;
use std::io::Write;
use std::path::Path;

// Excel hard limits
pub const MAX_ROWS: usize = 1_048_576;
pub const MAX_COLS: usize = 16_384;
const MAX_SHEET_NAME_LEN: usize = 31;
const MAX_ROW_HEIGHT: f64 = 409.5;
const MAX_COL_WIDTH: f64 = 255.0;
const INVALID_SHEET_CHARS: &str = "[]:*?/\\";

/// Collected pre-write problems
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
    }

    pub fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    pub fn check(&mut self, outcome: Result<(), String>) {
        if let Err(e) = outcome {
            self.add_error(e);
        }
    }

    pub fn to_error(self) -> Result<(), WriteError> {
        for w in &self.warnings {
            log::warn!("{}", w);
        }
        if self.is_valid() {
            Ok(())
        } else {
            Err(WriteError::Validation(format!(
                "Validation failed with {} errors:\n{}",
                self.errors.len(),
                self.errors.join("\n")
            )))
        }
    }
}

/// Validate sheet name meets Excel requirements
pub fn validate_sheet_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Sheet name cannot be empty".to_string());
    }

    let len = name.chars().count();
    if len > MAX_SHEET_NAME_LEN {
        return Err(format!(
            "Sheet name '{}' exceeds {} characters (has {})",
            name, MAX_SHEET_NAME_LEN, len
        ));
    }

    if let Some(c) = name.chars().find(|c| INVALID_SHEET_CHARS.contains(*c)) {
        return Err(format!(
            "Sheet name '{}' contains invalid character '{}'",
            name, c
        ));
    }

    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(format!("Sheet name '{}' cannot start or end with '", name));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(format!("Sheet name '{}' contains control characters", name));
    }

    Ok(())
}

pub fn validate_grid_size(rows: usize, cols: usize) -> Result<(), String> {
    if rows > MAX_ROWS {
        return Err(format!("{} rows exceed the limit of {}", rows, MAX_ROWS));
    }
    if cols > MAX_COLS {
        return Err(format!("{} columns exceed the limit of {}", cols, MAX_COLS));
    }
    Ok(())
}

/// Validate 1-based cell coordinates are within Excel limits
pub fn validate_cell_coords(row: u32, col: u32, context: &str) -> Result<(), String> {
    if row == 0 || row as usize > MAX_ROWS {
        return Err(format!(
            "{}: Row {} is out of range (must be 1-{})",
            context, row, MAX_ROWS
        ));
    }

    if col == 0 || col as usize > MAX_COLS {
        return Err(format!(
            "{}: Column {} is out of range (must be 1-{})",
            context, col, MAX_COLS
        ));
    }

    Ok(())
}

pub fn validate_row_height(height: f64) -> Result<(), String> {
    if !(0.0..=MAX_ROW_HEIGHT).contains(&height) {
        return Err(format!(
            "Row height {} out of range (0-{})",
            height, MAX_ROW_HEIGHT
        ));
    }
    Ok(())
}

pub fn validate_col_width(width: f64) -> Result<(), String> {
    if !(0.0..=MAX_COL_WIDTH).contains(&width) {
        return Err(format!(
            "Column width {} out of range (0-{})",
            width, MAX_COL_WIDTH
        ));
    }
    Ok(())
}

/// Everything the encoder needs to hold before it starts producing bytes.
pub fn validate_export(sheet: &SheetData, layout: &LayoutConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.check(sheet.validate());
    result.check(layout.validate());

    if sheet.num_rows() == 0 {
        result.add_warning(format!("Sheet '{}' has no rows", sheet.name));
    }

    result
}

/// Check the target can be written before any work is done.
pub fn validate_output_path(filename: &str) -> Result<(), WriteError> {
    if filename.is_empty() {
        return Err(WriteError::Validation("Filename cannot be empty".to_string()));
    }

    let path = Path::new(filename);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(WriteError::Validation(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }

    if path.is_dir() {
        return Err(WriteError::Validation(format!(
            "Output path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Atomic file writing with rollback on error. Each call gets its own uniquely named
/// temp file, so concurrent writers never share one.
pub fn write_file_atomic<F>(filename: &str, write_fn: F) -> Result<(), WriteError>
where
    F: FnOnce(&mut fs::File) -> Result<(), WriteError>,
{
    validate_output_path(filename)?;

    let path = Path::new(filename);
    // Same directory so the rename stays on one filesystem
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Dropping the temp file on any early return removes it
    let mut temp = tempfile::Builder::new()
        .prefix(".thumbxl-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    write_fn(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| WriteError::Io(e.error))?;
    Ok(())
}

pub fn write_bytes_atomic(filename: &str, bytes: &[u8]) -> Result<(), WriteError> {
    write_file_atomic(filename, |file| {
        file.write_all(bytes)?;
        Ok(())
    })
}
