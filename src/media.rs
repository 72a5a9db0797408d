//! Image payloads: `data:` URL parsing and format identification.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
}

impl ImageKind {
    /// Kind named by a MIME type. Anything unrecognised is treated as PNG.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.contains("png") {
            ImageKind::Png
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            ImageKind::Jpeg
        } else if mime.contains("webp") {
            ImageKind::Webp
        } else if mime.contains("gif") {
            ImageKind::Gif
        } else if mime.contains("bmp") {
            ImageKind::Bmp
        } else {
            ImageKind::Png
        }
    }

    /// Kind identified by the payload's magic bytes, if it is one the package can carry.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::WebP => Some(ImageKind::Webp),
            ImageFormat::Gif => Some(ImageKind::Gif),
            ImageFormat::Bmp => Some(ImageKind::Bmp),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Webp => "webp",
            ImageKind::Gif => "gif",
            ImageKind::Bmp => "bmp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Webp => "image/webp",
            ImageKind::Gif => "image/gif",
            ImageKind::Bmp => "image/bmp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

/// Decode `data:<mime>;base64,<payload>`.
///
/// The declared MIME type picks the kind, unless the payload's own signature says
/// otherwise; the bytes win so the part extension never lies about its content.
pub fn parse_data_url(url: &str) -> Result<DecodedImage, String> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URL".to_string())?;
    let marker = rest
        .find(";base64,")
        .ok_or_else(|| "data URL is not base64-encoded".to_string())?;

    let mime = rest[..marker].split(';').next().unwrap_or("").trim();
    if mime.is_empty() {
        return Err("data URL has no media type".to_string());
    }

    let payload = &rest[marker + ";base64,".len()..];
    let decoded = if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: Vec<u8> = payload
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(payload)
    };
    let bytes = decoded.map_err(|e| format!("invalid base64 payload: {}", e))?;

    if bytes.is_empty() {
        return Err("data URL payload is empty".to_string());
    }

    let declared = ImageKind::from_mime(mime);
    let kind = match ImageKind::sniff(&bytes) {
        Some(sniffed) if sniffed != declared => {
            log::debug!(
                "data URL declares {} but payload is {}",
                mime,
                sniffed.content_type()
            );
            sniffed
        }
        _ => declared,
    };

    Ok(DecodedImage { kind, bytes })
}

/// Encode raw bytes as a `data:` URL.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    let mut url = String::with_capacity(mime.len() + 13 + bytes.len() * 4 / 3 + 4);
    url.push_str("data:");
    url.push_str(mime);
    url.push_str(";base64,");
    STANDARD.encode_string(bytes, &mut url);
    url
}
