//! Turns image references into embeddable `data:` URLs.
use crate::media::{to_data_url, ImageKind};
use crate::types::ImagePlacement;
use rayon::prelude::*;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

const USER_AGENT: &str = concat!("thumbxl/", env!("CARGO_PKG_VERSION"));

/// Largest image body read from a remote source.
pub const MAX_REMOTE_BYTES: u64 = 16 * 1024 * 1024;

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetches the bytes behind an image reference and returns them as a `data:` URL.
pub trait ImageFetcher: Sync {
    fn fetch(&self, source: &str) -> Result<String, String>;
}

/// Reads `file://` URLs and plain filesystem paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl ImageFetcher for LocalFetcher {
    fn fetch(&self, source: &str) -> Result<String, String> {
        if is_remote(source) {
            return Err(format!("remote source not supported: {}", source));
        }

        let path = source.strip_prefix("file://").unwrap_or(source);
        let bytes = fs::read(Path::new(path)).map_err(|e| format!("{}: {}", path, e))?;
        if bytes.is_empty() {
            return Err(format!("{}: file is empty", path));
        }

        let kind = ImageKind::sniff(&bytes)
            .ok_or_else(|| format!("{}: not a recognised image format", path))?;
        Ok(to_data_url(kind.content_type(), &bytes))
    }
}

/// Downloads `http://` and `https://` sources.
///
/// The MIME type comes from the response `Content-Type` when it names an image, otherwise
/// from the body's magic bytes. Error statuses, empty bodies and bodies that are not a
/// known image format are rejected.
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(25))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent: config.into(),
            max_bytes: MAX_REMOTE_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, source: &str) -> Result<String, String> {
        if !is_remote(source) {
            return Err(format!("not an http(s) URL: {}", source));
        }

        let mut response = self
            .agent
            .get(source)
            .call()
            .map_err(|e| format!("{}: {}", source, e))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(format!("{}: HTTP {}", source, status));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());

        let mut bytes = Vec::new();
        response
            .body_mut()
            .as_reader()
            .take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| format!("{}: {}", source, e))?;
        if bytes.is_empty() {
            return Err(format!("{}: empty response body", source));
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(format!("{}: image larger than {} bytes", source, self.max_bytes));
        }

        let mime = match content_type {
            Some(ct) if ct.starts_with("image/") => ImageKind::from_mime(&ct).content_type(),
            _ => ImageKind::sniff(&bytes)
                .ok_or_else(|| format!("{}: response is not a recognised image", source))?
                .content_type(),
        };
        log::debug!("fetched {} ({} bytes, {})", source, bytes.len(), mime);
        Ok(to_data_url(mime, &bytes))
    }
}

/// Sends `http(s)` sources to [`HttpFetcher`] and everything else to [`LocalFetcher`].
#[derive(Default)]
pub struct SourceFetcher {
    http: HttpFetcher,
    local: LocalFetcher,
}

impl SourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(http: HttpFetcher) -> Self {
        Self {
            http,
            local: LocalFetcher,
        }
    }
}

impl ImageFetcher for SourceFetcher {
    fn fetch(&self, source: &str) -> Result<String, String> {
        if is_remote(source) {
            self.http.fetch(source)
        } else {
            self.local.fetch(source)
        }
    }
}

/// Resolve every non-`data:` source concurrently. Failures keep the original reference
/// so the decode step can report and skip that one image.
pub fn resolve_sources(images: &[ImagePlacement], fetcher: &dyn ImageFetcher) -> Vec<ImagePlacement> {
    images
        .par_iter()
        .enumerate()
        .map(|(index, placement)| {
            if placement.is_data_url() {
                return placement.clone();
            }
            match fetcher.fetch(&placement.source) {
                Ok(url) => ImagePlacement {
                    source: url,
                    ..placement.clone()
                },
                Err(e) => {
                    log::warn!("could not resolve image #{}: {}", index, e);
                    placement.clone()
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::PNG_1X1;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Answer a single request on a loopback port; returns the URL to fetch.
    fn serve_once(status: &'static str, content_type: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                content_type,
                body.len()
            );
            // The client may hang up early on capped reads
            let _ = stream.write_all(head.as_bytes()).and_then(|_| stream.write_all(body));
        });
        format!("http://{}/thumb.png", addr)
    }

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl ImageFetcher for CountingFetcher {
        fn fetch(&self, source: &str) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if source.contains("broken") {
                Err("unreachable".to_string())
            } else {
                Ok(to_data_url("image/png", PNG_1X1))
            }
        }
    }

    #[test]
    fn test_resolve_keeps_order_and_data_urls() {
        let inline = to_data_url("image/png", PNG_1X1);
        let images = vec![
            ImagePlacement::new(2, 2, "https://cdn/a.png"),
            ImagePlacement::new(3, 2, inline.clone()),
            ImagePlacement::new(4, 2, "https://cdn/broken.png"),
        ];
        let fetcher = CountingFetcher { calls: AtomicUsize::new(0) };
        let resolved = resolve_sources(&images, &fetcher);

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolved.len(), 3);
        assert!(resolved[0].is_data_url());
        assert_eq!(resolved[1].source, inline);
        assert_eq!(resolved[2].source, "https://cdn/broken.png");
        assert_eq!(resolved[2].row, 4);
    }

    #[test]
    fn test_local_fetcher_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        fs::write(&path, PNG_1X1).unwrap();

        let plain = LocalFetcher.fetch(path.to_str().unwrap()).unwrap();
        assert!(plain.starts_with("data:image/png;base64,"));
        let url = format!("file://{}", path.display());
        assert_eq!(LocalFetcher.fetch(&url).unwrap(), plain);
    }

    #[test]
    fn test_local_fetcher_rejects_remote_and_unknown() {
        assert!(LocalFetcher.fetch("https://example.com/a.png").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();
        assert!(LocalFetcher.fetch(path.to_str().unwrap()).is_err());
        assert!(LocalFetcher.fetch("/no/such/file.png").is_err());
    }

    #[test]
    fn test_http_fetcher_uses_content_type() {
        let url = serve_once("200 OK", "image/png; charset=binary", PNG_1X1);
        let data = HttpFetcher::new().fetch(&url).unwrap();
        assert_eq!(data, to_data_url("image/png", PNG_1X1));
    }

    #[test]
    fn test_http_fetcher_sniffs_generic_content_type() {
        let url = serve_once("200 OK", "application/octet-stream", PNG_1X1);
        let data = HttpFetcher::new().fetch(&url).unwrap();
        assert!(data.starts_with("data:image/png;base64,"));

        let url = serve_once("200 OK", "text/html", b"<html></html>");
        let err = HttpFetcher::new().fetch(&url).unwrap_err();
        assert!(err.contains("not a recognised image"));
    }

    #[test]
    fn test_http_fetcher_rejects_error_status_and_oversize() {
        let url = serve_once("404 Not Found", "text/plain", b"missing");
        let err = HttpFetcher::new().fetch(&url).unwrap_err();
        assert!(err.contains("HTTP 404"));

        let url = serve_once("200 OK", "image/png", PNG_1X1);
        let err = HttpFetcher::new().with_max_bytes(8).fetch(&url).unwrap_err();
        assert!(err.contains("larger than 8 bytes"));
    }

    #[test]
    fn test_source_fetcher_routes_by_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        fs::write(&path, PNG_1X1).unwrap();
        let fetcher = SourceFetcher::new();

        let local = fetcher.fetch(path.to_str().unwrap()).unwrap();
        let url = serve_once("200 OK", "image/png", PNG_1X1);
        assert_eq!(fetcher.fetch(&url).unwrap(), local);
        assert!(HttpFetcher::new().fetch(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_resolve_downloads_remote_placements() {
        let url = serve_once("200 OK", "image/png", PNG_1X1);
        let images = vec![ImagePlacement::new(2, 2, url)];
        let resolved = resolve_sources(&images, &SourceFetcher::new());
        assert_eq!(resolved[0].source, to_data_url("image/png", PNG_1X1));
    }
}
