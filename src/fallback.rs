//! Plain-text renditions of a sheet: CSV and an HTML table that spreadsheet apps open.
use crate::types::{ImagePlacement, SheetData};
use crate::xml::escape_str;
use std::collections::HashMap;

const UTF8_BOM: &str = "\u{FEFF}";

/// CSV with a UTF-8 BOM. Every cell is quoted; quotes are doubled.
pub fn to_csv(sheet: &SheetData) -> String {
    let mut out = String::with_capacity(
        UTF8_BOM.len() + sheet.rows.iter().map(|r| r.len() * 8).sum::<usize>(),
    );
    out.push_str(UTF8_BOM);

    for (i, row) in sheet.rows.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for (j, cell) in row.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            out.push('"');
            if let Some(text) = cell {
                out.push_str(&text.replace('"', "\"\""));
            }
            out.push('"');
        }
    }
    out
}

/// Standalone HTML document with one bordered table. Images are drawn as `<img>` in
/// their anchor cells, replacing any text there.
pub fn to_html_table(sheet: &SheetData, images: &[ImagePlacement]) -> String {
    let by_cell: HashMap<(usize, usize), &ImagePlacement> = images
        .iter()
        .filter(|img| img.row >= 1 && img.col >= 1)
        .map(|img| ((img.row as usize - 1, img.col as usize - 1), img))
        .collect();

    let mut html = String::with_capacity(512 + sheet.rows.len() * 128);
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>");
    html.push_str(&escape_str(&sheet.name));
    html.push_str("</title></head><body>\n<table border=\"1\" style=\"border-collapse:collapse\">\n");

    let num_cols = sheet.num_cols();
    for (r, row) in sheet.rows.iter().enumerate() {
        let tag = if r == 0 { "th" } else { "td" };
        html.push_str("<tr>");
        for c in 0..num_cols {
            html.push('<');
            html.push_str(tag);
            html.push('>');
            if let Some(img) = by_cell.get(&(r, c)) {
                html.push_str("<img src=\"");
                html.push_str(&escape_str(&img.source));
                html.push('"');
                if let Some(w) = img.width_px {
                    html.push_str(&format!(" width=\"{}\"", w));
                }
                if let Some(h) = img.height_px {
                    html.push_str(&format!(" height=\"{}\"", h));
                }
                html.push_str(">");
            } else if let Some(Some(text)) = row.get(c) {
                html.push_str(&escape_str(text));
            }
            html.push_str("</");
            html.push_str(tag);
            html.push('>');
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</table>\n</body></html>\n");
    html
}
