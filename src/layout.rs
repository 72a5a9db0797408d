//! Column widths and row heights for thumbnail sheets.
//!
//! Widths are in Excel character units, heights in points. The defaults are hand-tuned
//! for a 100 px thumbnail in column B; `for_thumbnail` derives the same numbers from
//! 0.75 pt/px and the 7 px per character (+5 px padding) column convention.

/// EMUs per pixel at 96 DPI.
pub const EMU_PER_PX: u64 = 9525;
pub const POINTS_PER_PX: f64 = 0.75;
const PX_PER_CHAR: f64 = 7.0;
const COL_PADDING_PX: f64 = 5.0;

pub const DEFAULT_THUMBNAIL_PX: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// 1-based column holding the running index.
    pub index_col: u32,
    /// 1-based column the thumbnails sit in.
    pub image_col: u32,
    pub index_col_width: f64,
    pub image_col_width: f64,
    pub default_col_width: f64,
    pub header_row_height: f64,
    pub data_row_height: f64,
    /// Size used for images that carry no explicit pixel dimensions.
    pub thumbnail_px: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            index_col: 1,
            image_col: 2,
            index_col_width: 6.0,
            image_col_width: 14.3,
            default_col_width: 20.0,
            header_row_height: 18.0,
            data_row_height: 75.0,
            thumbnail_px: DEFAULT_THUMBNAIL_PX,
        }
    }
}

impl LayoutConfig {
    /// Layout whose image column and data rows fit a square thumbnail of `px` pixels.
    pub fn for_thumbnail(px: u32) -> Self {
        let px_f = px as f64;
        Self {
            image_col_width: round2((px_f + COL_PADDING_PX) / PX_PER_CHAR),
            data_row_height: round2(px_f * POINTS_PER_PX),
            thumbnail_px: px,
            ..Self::default()
        }
    }

    pub fn col_width(&self, col: u32) -> f64 {
        if col == self.index_col {
            self.index_col_width
        } else if col == self.image_col {
            self.image_col_width
        } else {
            self.default_col_width
        }
    }

    /// Height in points for a 1-based row.
    pub fn row_height(&self, row: u32) -> f64 {
        if row <= 1 {
            self.header_row_height
        } else {
            self.data_row_height
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        crate::validation::validate_col_width(self.index_col_width)?;
        crate::validation::validate_col_width(self.image_col_width)?;
        crate::validation::validate_col_width(self.default_col_width)?;
        crate::validation::validate_row_height(self.header_row_height)?;
        crate::validation::validate_row_height(self.data_row_height)?;
        if self.index_col == 0 || self.image_col == 0 {
            return Err("Layout columns are 1-based".to_string());
        }
        if self.thumbnail_px == 0 {
            return Err("Thumbnail size must be positive".to_string());
        }
        Ok(())
    }
}

#[inline]
pub fn px_to_emu(px: u32) -> u64 {
    px as u64 * EMU_PER_PX
}

#[inline]
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
