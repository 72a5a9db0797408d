use crate::layout::{px_to_emu, LayoutConfig};
use crate::media::ImageKind;
use crate::types::SheetData;
use chrono::{DateTime, Utc};

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const REL_OFFICE_DOC: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_CORE_PROPS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
const REL_EXT_PROPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

pub const GENERATOR: &str = "thumbxl";

/// A picture pinned to one cell; `row`/`col` are 1-based and already clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawingAnchor {
    pub row: u32,
    pub col: u32,
    pub width_px: u32,
    pub height_px: u32,
    /// 1-based position in the drawing's relationship list.
    pub media_idx: usize,
}

/// An image part as referenced from the drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub idx: usize,
    pub kind: ImageKind,
}

impl MediaRef {
    pub fn file_name(&self) -> String {
        format!("image{}.{}", self.idx, self.kind.extension())
    }
}

/// Letters needed for the largest `usize` column.
pub const MAX_COL_LETTERS: usize = 14;

/// Zero-allocation column letter writing - returns length written.
/// `col` is 0-based.
#[inline(always)]
pub fn write_col_letter(col: usize, buf: &mut [u8; MAX_COL_LETTERS]) -> usize {
    if col < 26 {
        buf[0] = b'A' + col as u8;
        return 1;
    }

    let mut col = col;
    let mut stack = [0u8; MAX_COL_LETTERS];
    let mut stack_len = 0;

    while col >= 26 {
        stack[stack_len] = b'A' + (col % 26) as u8;
        stack_len += 1;
        col = col / 26 - 1;
    }
    stack[stack_len] = b'A' + col as u8;
    stack_len += 1;

    for i in 0..stack_len {
        buf[i] = stack[stack_len - 1 - i];
    }

    stack_len
}

/// Column letters for a 1-based column number: 1 -> "A", 27 -> "AA".
pub fn col_letter(col: u32) -> String {
    debug_assert!(col >= 1);
    let mut buf = [0u8; MAX_COL_LETTERS];
    let len = write_col_letter(col.saturating_sub(1) as usize, &mut buf);
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

/// Write cell reference (e.g. "A1", "B2") to buffer; `col` 0-based, `row` 1-based.
#[inline(always)]
fn write_cell_ref(col: usize, row: usize, buf: &mut Vec<u8>) {
    let mut col_buf = [0u8; MAX_COL_LETTERS];
    let col_len = write_col_letter(col, &mut col_buf);
    buf.extend_from_slice(&col_buf[..col_len]);
    buf.extend_from_slice(itoa::Buffer::new().format(row).as_bytes());
}

#[inline]
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

/// XML escaping with a memchr fast path. Characters XML 1.0 cannot carry are dropped and
/// `\r` becomes `&#13;`, since parsers normalise a literal CR to LF.
#[inline(always)]
pub fn xml_escape_simd(input: &[u8], output: &mut Vec<u8>) {
    let needs_escape = memchr::memchr3(b'&', b'<', b'>', input).is_some()
        || memchr::memchr3(b'"', b'\'', b'\r', input).is_some();
    let has_control = input
        .iter()
        .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
        || memchr::memchr(0xEF, input).is_some();

    if !needs_escape && !has_control {
        output.extend_from_slice(input);
        return;
    }

    if has_control {
        // Slow path: go through chars so multi-byte rejects (U+FFFE/U+FFFF) are caught too
        let text = String::from_utf8_lossy(input);
        let mut tmp = [0u8; 4];
        for c in text.chars() {
            match c {
                '&' => output.extend_from_slice(b"&amp;"),
                '<' => output.extend_from_slice(b"&lt;"),
                '>' => output.extend_from_slice(b"&gt;"),
                '"' => output.extend_from_slice(b"&quot;"),
                '\'' => output.extend_from_slice(b"&apos;"),
                '\r' => output.extend_from_slice(b"&#13;"),
                c if is_xml_char(c) => output.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes()),
                _ => {}
            }
        }
        return;
    }

    let mut last = 0;
    let mut pos = 0;

    while pos < input.len() {
        let byte = input[pos];
        let escape: &[u8] = match byte {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'"' => b"&quot;",
            b'\'' => b"&apos;",
            b'\r' => b"&#13;",
            _ => {
                pos += 1;
                continue;
            }
        };

        output.extend_from_slice(&input[last..pos]);
        output.extend_from_slice(escape);
        pos += 1;
        last = pos;
    }

    if last < input.len() {
        output.extend_from_slice(&input[last..]);
    }
}

pub fn escape_str(s: &str) -> String {
    let mut buf = Vec::with_capacity(s.len() + 8);
    xml_escape_simd(s.as_bytes(), &mut buf);
    String::from_utf8(buf).unwrap_or_default()
}

pub fn generate_content_types(image_kinds: &[ImageKind]) -> String {
    let mut kinds = image_kinds.to_vec();
    kinds.sort();
    kinds.dedup();

    let mut xml = String::with_capacity(1200 + kinds.len() * 80);
    xml.push_str(XML_DECL);
    xml.push_str(
        "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
    );

    for kind in kinds {
        xml.push_str("<Default Extension=\"");
        xml.push_str(kind.extension());
        xml.push_str("\" ContentType=\"");
        xml.push_str(kind.content_type());
        xml.push_str("\"/>");
    }

    xml.push_str(
        "<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
<Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>\
<Override PartName=\"/xl/drawings/drawing1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.drawing+xml\"/>\
<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\
<Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>\
</Types>",
    );
    xml
}

fn push_relationship(xml: &mut String, id: &str, rel_type: &str, target: &str) {
    xml.push_str("<Relationship Id=\"");
    xml.push_str(id);
    xml.push_str("\" Type=\"");
    xml.push_str(rel_type);
    xml.push_str("\" Target=\"");
    xml.push_str(target);
    xml.push_str("\"/>");
}

fn relationships(rels: &[(&str, &str, &str)]) -> String {
    let mut xml = String::with_capacity(200 + rels.len() * 160);
    xml.push_str(XML_DECL);
    xml.push_str("<Relationships xmlns=\"");
    xml.push_str(NS_PKG_REL);
    xml.push_str("\">");
    for (id, rel_type, target) in rels {
        push_relationship(&mut xml, id, rel_type, target);
    }
    xml.push_str("</Relationships>");
    xml
}

pub fn generate_rels() -> String {
    relationships(&[
        ("rId1", REL_OFFICE_DOC, "xl/workbook.xml"),
        ("rId2", REL_CORE_PROPS, "docProps/core.xml"),
        ("rId3", REL_EXT_PROPS, "docProps/app.xml"),
    ])
}

pub fn generate_workbook(sheet_name: &str) -> String {
    let mut xml = String::with_capacity(400 + sheet_name.len());
    xml.push_str(XML_DECL);
    xml.push_str("<workbook xmlns=\"");
    xml.push_str(NS_MAIN);
    xml.push_str("\" xmlns:r=\"");
    xml.push_str(NS_REL);
    xml.push_str("\"><sheets><sheet name=\"");
    xml.push_str(&escape_str(sheet_name));
    xml.push_str("\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>");
    xml
}

pub fn generate_workbook_rels() -> String {
    relationships(&[("rId1", REL_WORKSHEET, "worksheets/sheet1.xml")])
}

pub fn generate_worksheet_rels() -> String {
    relationships(&[("rId1", REL_DRAWING, "../drawings/drawing1.xml")])
}

pub fn generate_core_xml(created: DateTime<Utc>) -> String {
    let stamp = created.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    format!(
        "{decl}<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
xmlns:dc=\"http://purl.org/dc/elements/1.1/\" \
xmlns:dcterms=\"http://purl.org/dc/terms/\" \
xmlns:dcmitype=\"http://purl.org/dc/dcmitype/\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
<dc:title>Export</dc:title>\
<dc:creator>{app}</dc:creator>\
<cp:lastModifiedBy>{app}</cp:lastModifiedBy>\
<dcterms:created xsi:type=\"dcterms:W3CDTF\">{stamp}</dcterms:created>\
<dcterms:modified xsi:type=\"dcterms:W3CDTF\">{stamp}</dcterms:modified>\
</cp:coreProperties>",
        decl = XML_DECL,
        app = GENERATOR,
        stamp = stamp,
    )
}

pub fn generate_app_xml() -> String {
    format!(
        "{}<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\" \
xmlns:vt=\"http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes\">\
<Application>{}</Application>\
</Properties>",
        XML_DECL, GENERATOR
    )
}

#[inline]
fn push_num(buf: &mut Vec<u8>, v: f64) {
    if v.fract() == 0.0 {
        buf.extend_from_slice(itoa::Buffer::new().format(v as i64).as_bytes());
    } else {
        buf.extend_from_slice(ryu::Buffer::new().format(v).as_bytes());
    }
}

fn estimate_sheet_size(sheet: &SheetData) -> usize {
    let text: usize = sheet
        .rows
        .iter()
        .flat_map(|r| r.iter())
        .map(|c| c.as_ref().map_or(0, |s| s.len() + 48))
        .sum();
    600 + sheet.num_cols() * 60 + sheet.num_rows() * 48 + text
}

/// Worksheet with inline-string cells, fixed column widths and row heights,
/// and a reference to the drawing part.
/// Element order: dimension → sheetFormatPr → cols → sheetData → drawing
pub fn generate_sheet_xml(sheet: &SheetData, layout: &LayoutConfig) -> Vec<u8> {
    let num_rows = sheet.num_rows();
    let num_cols = sheet.num_cols();

    let mut buf = Vec::with_capacity(estimate_sheet_size(sheet));
    buf.extend_from_slice(XML_DECL.as_bytes());
    buf.extend_from_slice(b"<worksheet xmlns=\"");
    buf.extend_from_slice(NS_MAIN.as_bytes());
    buf.extend_from_slice(b"\" xmlns:r=\"");
    buf.extend_from_slice(NS_REL.as_bytes());
    buf.extend_from_slice(b"\">");

    // 1. DIMENSION
    buf.extend_from_slice(b"<dimension ref=\"A1");
    if num_rows > 0 && num_cols > 0 && (num_rows > 1 || num_cols > 1) {
        buf.push(b':');
        write_cell_ref(num_cols - 1, num_rows, &mut buf);
    }
    buf.extend_from_slice(b"\"/>");

    // 2. SHEETFORMATPR
    buf.extend_from_slice(b"<sheetFormatPr defaultRowHeight=\"15\"/>");

    // 3. COLS
    if num_cols > 0 {
        let mut int_buf = itoa::Buffer::new();
        buf.extend_from_slice(b"<cols>");
        for col in 1..=num_cols {
            let n = int_buf.format(col).as_bytes().to_vec();
            buf.extend_from_slice(b"<col min=\"");
            buf.extend_from_slice(&n);
            buf.extend_from_slice(b"\" max=\"");
            buf.extend_from_slice(&n);
            buf.extend_from_slice(b"\" width=\"");
            push_num(&mut buf, layout.col_width(col as u32));
            buf.extend_from_slice(b"\" customWidth=\"1\"/>");
        }
        buf.extend_from_slice(b"</cols>");
    }

    // 4. SHEETDATA
    if num_rows == 0 {
        buf.extend_from_slice(b"<sheetData/>");
    } else {
        buf.extend_from_slice(b"<sheetData>");

        let col_letters: Vec<([u8; MAX_COL_LETTERS], usize)> = (0..num_cols)
            .map(|i| {
                let mut col_buf = [0u8; MAX_COL_LETTERS];
                let len = write_col_letter(i, &mut col_buf);
                (col_buf, len)
            })
            .collect();
        let mut int_buf = itoa::Buffer::new();

        for (row_idx, row) in sheet.rows.iter().enumerate() {
            let row_num = row_idx + 1;
            let row_bytes = int_buf.format(row_num).as_bytes().to_vec();

            buf.extend_from_slice(b"<row r=\"");
            buf.extend_from_slice(&row_bytes);
            buf.extend_from_slice(b"\" ht=\"");
            push_num(&mut buf, layout.row_height(row_num as u32));
            buf.extend_from_slice(b"\" customHeight=\"1\">");

            for (col_idx, value) in row.iter().enumerate() {
                let text = match value.as_deref() {
                    Some(s) if !s.is_empty() => s,
                    _ => continue,
                };
                let (col_letter, col_len) = &col_letters[col_idx];

                buf.extend_from_slice(b"<c r=\"");
                buf.extend_from_slice(&col_letter[..*col_len]);
                buf.extend_from_slice(&row_bytes);
                buf.extend_from_slice(b"\" t=\"inlineStr\"><is>");
                if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
                    buf.extend_from_slice(b"<t xml:space=\"preserve\">");
                } else {
                    buf.extend_from_slice(b"<t>");
                }
                xml_escape_simd(text.as_bytes(), &mut buf);
                buf.extend_from_slice(b"</t></is></c>");
            }
            buf.extend_from_slice(b"</row>");
        }

        buf.extend_from_slice(b"</sheetData>");
    }

    // 5. DRAWING
    buf.extend_from_slice(b"<drawing r:id=\"rId1\"/>");
    buf.extend_from_slice(b"</worksheet>");
    buf
}

/// Drawing canvas with one non-resizing one-cell anchor per picture.
pub fn generate_drawing(anchors: &[DrawingAnchor]) -> String {
    let mut xml = String::with_capacity(400 + anchors.len() * 700);
    xml.push_str(XML_DECL);
    xml.push_str(
        "<xdr:wsDr xmlns:xdr=\"http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing\" \
xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" xmlns:r=\"",
    );
    xml.push_str(NS_REL);
    xml.push_str("\">");

    let mut int_buf = itoa::Buffer::new();
    for (i, anchor) in anchors.iter().enumerate() {
        let pic_id = i + 1;
        xml.push_str("<xdr:oneCellAnchor><xdr:from><xdr:col>");
        xml.push_str(int_buf.format(anchor.col - 1));
        xml.push_str("</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>");
        xml.push_str(int_buf.format(anchor.row - 1));
        xml.push_str("</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:ext cx=\"");
        xml.push_str(int_buf.format(px_to_emu(anchor.width_px)));
        xml.push_str("\" cy=\"");
        xml.push_str(int_buf.format(px_to_emu(anchor.height_px)));
        xml.push_str("\"/><xdr:pic><xdr:nvPicPr><xdr:cNvPr id=\"");
        xml.push_str(int_buf.format(pic_id));
        xml.push_str("\" name=\"Picture ");
        xml.push_str(int_buf.format(pic_id));
        xml.push_str(
            "\"/><xdr:cNvPicPr><a:picLocks noChangeAspect=\"1\"/></xdr:cNvPicPr></xdr:nvPicPr>\
<xdr:blipFill><a:blip r:embed=\"rId",
        );
        xml.push_str(int_buf.format(anchor.media_idx));
        xml.push_str(
            "\"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>\
<xdr:spPr><a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></xdr:spPr>\
</xdr:pic><xdr:clientData/></xdr:oneCellAnchor>",
        );
    }

    xml.push_str("</xdr:wsDr>");
    xml
}

pub fn generate_drawing_rels(media: &[MediaRef]) -> String {
    let mut xml = String::with_capacity(200 + media.len() * 160);
    xml.push_str(XML_DECL);
    xml.push_str("<Relationships xmlns=\"");
    xml.push_str(NS_PKG_REL);
    xml.push_str("\">");
    for m in media {
        let id = format!("rId{}", m.idx);
        let target = format!("../media/{}", m.file_name());
        push_relationship(&mut xml, &id, REL_IMAGE, &target);
    }
    xml.push_str("</Relationships>");
    xml
}
