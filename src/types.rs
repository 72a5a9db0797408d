use serde::Deserialize;

/// One worksheet worth of text cells. Row 0 is the header row.
#[derive(Debug, Clone, Default)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<Option<String>>>,
}

impl SheetData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Build a sheet from plain strings; empty strings are kept and skipped at render time.
    pub fn from_rows<R, S>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|v| Some(v.into())).collect())
                .collect(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Option<String>>) {
        self.rows.push(row);
    }

    pub fn validate(&self) -> Result<(), String> {
        crate::validation::validate_sheet_name(&self.name)?;
        crate::validation::validate_grid_size(self.num_rows(), self.num_cols())
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row.
    pub fn num_cols(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Cell text if present and non-empty. Coordinates are 0-based.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// An image pinned to the top-left corner of a cell.
///
/// `row`/`col` are 1-based. `source` is a `data:` URL once resolved; before resolution it
/// may be any reference an [`crate::resolve::ImageFetcher`] understands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImagePlacement {
    pub row: u32,
    pub col: u32,
    pub source: String,
    #[serde(default)]
    pub width_px: Option<u32>,
    #[serde(default)]
    pub height_px: Option<u32>,
}

impl ImagePlacement {
    pub fn new(row: u32, col: u32, source: impl Into<String>) -> Self {
        Self {
            row,
            col,
            source: source.into(),
            width_px: None,
            height_px: None,
        }
    }

    pub fn with_size(mut self, width_px: u32, height_px: u32) -> Self {
        self.width_px = Some(width_px);
        self.height_px = Some(height_px);
        self
    }

    pub fn is_data_url(&self) -> bool {
        self.source.starts_with("data:")
    }
}

/// One named part of the output package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug)]
pub enum WriteError {
    Io(std::io::Error),
    Validation(String),
    InvalidImage { index: usize, reason: String },
    Archive(String),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            WriteError::Io(e) => write!(f, "IO error: {}", e),
            WriteError::Validation(e) => write!(f, "Validation error: {}", e),
            WriteError::InvalidImage { index, reason } => {
                write!(f, "Invalid image #{}: {}", index, reason)
            }
            WriteError::Archive(e) => write!(f, "Archive error: {}", e),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WriteError {
    fn from(e: std::io::Error) -> Self {
        WriteError::Io(e)
    }
}
