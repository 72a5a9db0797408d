//! Scraped product listings and their conversion into a thumbnail sheet.
use crate::layout::LayoutConfig;
use crate::types::{ImagePlacement, SheetData};
use clap::ValueEnum;
use serde::Deserialize;

pub const NULL_CELL: &str = "null";

const BASIC_HEADERS: [&str; 3] = ["No.", "Cover", "Link"];
const DETAIL_HEADERS: [&str; 9] = [
    "No.",
    "Cover",
    "Link",
    "Location",
    "Wants",
    "Views",
    "Price",
    "Shop",
    "Description",
];
const BASIC_HEADERS_ZH: [&str; 3] = ["序号", "商品封面", "商品链接"];
const DETAIL_HEADERS_ZH: [&str; 9] = [
    "序号",
    "商品封面",
    "商品链接",
    "发布地",
    "想要数",
    "浏览量",
    "价格",
    "店铺名称",
    "产品文案",
];

/// Language of the header row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLabels {
    #[default]
    English,
    /// The labels the marketplace itself uses.
    Chinese,
}

impl HeaderLabels {
    pub fn headers(self, with_details: bool) -> &'static [&'static str] {
        match (self, with_details) {
            (HeaderLabels::English, false) => &BASIC_HEADERS,
            (HeaderLabels::English, true) => &DETAIL_HEADERS,
            (HeaderLabels::Chinese, false) => &BASIC_HEADERS_ZH,
            (HeaderLabels::Chinese, true) => &DETAIL_HEADERS_ZH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub url: Option<String>,
    pub cover_image: Option<String>,
    pub location: Option<String>,
    pub want_count: Option<String>,
    pub view_count: Option<String>,
    pub price: Option<String>,
    pub shop_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Plain,
    WantCount,
    ViewCount,
    CoverImage,
    Price,
    Description,
}

/// First decimal number in `s`, scaled by 10 000 when the text carries a 万 unit.
fn extract_count(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let start = bytes.iter().position(|b| b.is_ascii_digit())?;
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }

    let num: f64 = s[start..end].parse().ok()?;
    Some(if s.contains('万') { num * 10_000.0 } else { num })
}

fn format_count(n: f64) -> String {
    // Drop float noise from the 万 scaling (1.1 * 10000)
    let n = (n * 1e6).round() / 1e6;
    if n.fract() == 0.0 && n.abs() < 1e15 {
        itoa::Buffer::new().format(n as i64).to_string()
    } else {
        ryu::Buffer::new().format(n).to_string()
    }
}

fn or_null(s: &str) -> String {
    if s.is_empty() {
        NULL_CELL.to_string()
    } else {
        s.to_string()
    }
}

/// Normalise one scraped field for display. Missing or blank values become `"null"`.
pub fn clean_value(value: Option<&str>, kind: FieldKind) -> String {
    let value = match value {
        Some(v) if !v.is_empty() => v,
        _ => return NULL_CELL.to_string(),
    };

    match kind {
        FieldKind::WantCount | FieldKind::ViewCount => extract_count(value)
            .map(format_count)
            .unwrap_or_else(|| NULL_CELL.to_string()),
        FieldKind::CoverImage => or_null(value.split('?').next().unwrap_or("")),
        FieldKind::Price => {
            let stripped = match value.find(|c: char| c == '¥' || c == '￥') {
                Some(pos) => {
                    let sign_len = value[pos..].chars().next().map_or(0, char::len_utf8);
                    format!("{}{}", &value[..pos], &value[pos + sign_len..])
                }
                None => value.to_string(),
            };
            or_null(stripped.trim())
        }
        FieldKind::Description => {
            let mut out = String::with_capacity(value.len());
            let mut in_break = false;
            for c in value.chars() {
                if c == '\r' || c == '\n' {
                    if !in_break {
                        out.push(' ');
                    }
                    in_break = true;
                } else {
                    out.push(c);
                    in_break = false;
                }
            }
            or_null(out.trim())
        }
        FieldKind::Plain => or_null(value.trim()),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub keyword: String,
    pub products: Vec<Product>,
    pub with_details: bool,
    pub labels: HeaderLabels,
}

impl Dataset {
    pub fn new(keyword: impl Into<String>, products: Vec<Product>, with_details: bool) -> Self {
        Self {
            keyword: keyword.into(),
            products,
            with_details,
            labels: HeaderLabels::default(),
        }
    }

    pub fn with_labels(mut self, labels: HeaderLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn headers(&self) -> &'static [&'static str] {
        self.labels.headers(self.with_details)
    }

    /// Grid with a 1-based index column plus one thumbnail per product that has a cover.
    pub fn to_sheet(&self, layout: &LayoutConfig) -> (SheetData, Vec<ImagePlacement>) {
        let mut sheet = SheetData::new("Sheet1");
        sheet.push_row(self.headers().iter().map(|h| Some(h.to_string())).collect());

        let mut images = Vec::new();
        for (i, product) in self.products.iter().enumerate() {
            let cover = clean_value(product.cover_image.as_deref(), FieldKind::CoverImage);
            let mut row = vec![
                Some((i + 1).to_string()),
                Some(cover.clone()),
                Some(clean_value(product.url.as_deref(), FieldKind::Plain)),
            ];
            if self.with_details {
                row.extend([
                    clean_value(product.location.as_deref(), FieldKind::Plain),
                    clean_value(product.want_count.as_deref(), FieldKind::WantCount),
                    clean_value(product.view_count.as_deref(), FieldKind::ViewCount),
                    clean_value(product.price.as_deref(), FieldKind::Price),
                    clean_value(product.shop_name.as_deref(), FieldKind::Plain),
                    clean_value(product.description.as_deref(), FieldKind::Description),
                ]
                .into_iter()
                .map(Some));
            }
            sheet.push_row(row);

            if cover != NULL_CELL {
                let px = layout.thumbnail_px;
                images.push(
                    ImagePlacement::new(i as u32 + 2, layout.image_col, cover).with_size(px, px),
                );
            }
        }

        (sheet, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        assert_eq!(clean_value(Some("23人想要"), FieldKind::WantCount), "23");
        assert_eq!(clean_value(Some("1.5万浏览"), FieldKind::ViewCount), "15000");
        assert_eq!(clean_value(Some("1.1万"), FieldKind::ViewCount), "11000");
        assert_eq!(clean_value(Some("3.25"), FieldKind::WantCount), "3.25");
        assert_eq!(clean_value(Some("no digits"), FieldKind::WantCount), "null");
    }

    #[test]
    fn test_missing_and_blank() {
        assert_eq!(clean_value(None, FieldKind::Plain), "null");
        assert_eq!(clean_value(Some(""), FieldKind::Price), "null");
        assert_eq!(clean_value(Some("   "), FieldKind::Plain), "null");
        assert_eq!(clean_value(Some("?w=100"), FieldKind::CoverImage), "null");
    }

    #[test]
    fn test_cover_price_description() {
        assert_eq!(
            clean_value(Some("https://img/a.jpg?w=200&h=200"), FieldKind::CoverImage),
            "https://img/a.jpg"
        );
        assert_eq!(clean_value(Some("¥ 128"), FieldKind::Price), "128");
        assert_eq!(clean_value(Some("￥99.5"), FieldKind::Price), "99.5");
        assert_eq!(
            clean_value(Some("line one\r\n\r\nline two\n"), FieldKind::Description),
            "line one line two"
        );
    }

    #[test]
    fn test_product_deserialises_camel_case() {
        let p: Product =
            serde_json::from_str(r#"{"url":"u","coverImage":"c","wantCount":"5"}"#).unwrap();
        assert_eq!(p.cover_image.as_deref(), Some("c"));
        assert_eq!(p.want_count.as_deref(), Some("5"));
        assert_eq!(p.price, None);
    }

    #[test]
    fn test_basic_sheet_layout() {
        let products = vec![
            Product {
                url: Some("https://item/1".into()),
                cover_image: Some("https://img/1.png?x=1".into()),
                ..Product::default()
            },
            Product {
                url: Some("https://item/2".into()),
                ..Product::default()
            },
        ];
        let (sheet, images) = Dataset::new("lamp", products, false).to_sheet(&LayoutConfig::default());

        assert_eq!(sheet.num_rows(), 3);
        assert_eq!(sheet.num_cols(), 3);
        assert_eq!(sheet.cell(0, 1), Some("Cover"));
        assert_eq!(sheet.cell(1, 0), Some("1"));
        assert_eq!(sheet.cell(1, 1), Some("https://img/1.png"));
        assert_eq!(sheet.cell(2, 1), Some("null"));

        assert_eq!(images.len(), 1);
        assert_eq!((images[0].row, images[0].col), (2, 2));
        assert_eq!(images[0].source, "https://img/1.png");
    }

    #[test]
    fn test_detail_sheet_has_nine_columns() {
        let products = vec![Product {
            price: Some("¥10".into()),
            view_count: Some("2万".into()),
            ..Product::default()
        }];
        let (sheet, images) = Dataset::new("x", products, true).to_sheet(&LayoutConfig::default());
        assert_eq!(sheet.num_cols(), 9);
        assert_eq!(sheet.cell(0, 8), Some("Description"));
        assert_eq!(sheet.cell(1, 5), Some("20000"));
        assert_eq!(sheet.cell(1, 6), Some("10"));
        assert!(images.is_empty());
    }

    #[test]
    fn test_chinese_header_labels() {
        let products = vec![Product {
            url: Some("https://item/1".into()),
            ..Product::default()
        }];
        let dataset = Dataset::new("台灯", products, true).with_labels(HeaderLabels::Chinese);
        let (sheet, _) = dataset.to_sheet(&LayoutConfig::default());
        assert_eq!(sheet.cell(0, 0), Some("序号"));
        assert_eq!(sheet.cell(0, 1), Some("商品封面"));
        assert_eq!(sheet.cell(0, 8), Some("产品文案"));
        assert_eq!(sheet.cell(1, 2), Some("https://item/1"));

        assert_eq!(HeaderLabels::Chinese.headers(false), ["序号", "商品封面", "商品链接"]);
        assert_eq!(Dataset::new("x", vec![], false).headers()[1], "Cover");
    }

    #[test]
    fn test_labels_read_from_json() {
        let dataset: Dataset =
            serde_json::from_str(r#"{"keyword":"lamp","labels":"chinese"}"#).unwrap();
        assert_eq!(dataset.labels, HeaderLabels::Chinese);
        let dataset: Dataset = serde_json::from_str(r#"{"keyword":"lamp"}"#).unwrap();
        assert_eq!(dataset.labels, HeaderLabels::English);
    }
}
