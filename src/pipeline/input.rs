//! Input resolution: turn a path, URL, or byte buffer into a [`SourceDocument`].
//!
//! The media kind is *declared* here (file extension, `Content-Type` header,
//! or caller-supplied MIME string) and never sniffed later: the extractor
//! dispatches on it alone. A PNG renamed to `.pdf` is therefore sent down the
//! PDF branch and fails there as a corrupt PDF.

use crate::error::ExtractionError;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Image formats accepted by the OCR branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    /// File suffix tesseract uses to pick a decoder.
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
        }
    }
}

/// Declared media kind of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Image(ImageKind),
}

impl MediaKind {
    /// Parse a MIME type. Parameters (`; charset=…`) are ignored.
    pub fn from_mime(mime: &str) -> Result<Self, ExtractionError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Ok(MediaKind::Pdf),
            "image/png" => Ok(MediaKind::Image(ImageKind::Png)),
            "image/jpeg" | "image/jpg" => Ok(MediaKind::Image(ImageKind::Jpeg)),
            _ => Err(ExtractionError::UnsupportedMediaType {
                media: mime.to_string(),
            }),
        }
    }

    /// Infer the declared kind from a file name's extension.
    pub fn from_extension(name: &str) -> Result<Self, ExtractionError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(MediaKind::Pdf),
            "png" => Ok(MediaKind::Image(ImageKind::Png)),
            "jpg" | "jpeg" => Ok(MediaKind::Image(ImageKind::Jpeg)),
            _ => Err(ExtractionError::UnsupportedMediaType {
                media: if ext.is_empty() {
                    format!("(no extension: {name})")
                } else {
                    format!(".{ext}")
                },
            }),
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            MediaKind::Pdf => "application/pdf",
            MediaKind::Image(ImageKind::Png) => "image/png",
            MediaKind::Image(ImageKind::Jpeg) => "image/jpeg",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// An uploaded document: raw bytes plus their declared kind.
#[derive(Clone)]
pub struct SourceDocument {
    bytes: Vec<u8>,
    media: MediaKind,
    name: Option<String>,
}

impl SourceDocument {
    pub fn new(bytes: Vec<u8>, media: MediaKind) -> Self {
        Self {
            bytes,
            media,
            name: None,
        }
    }

    /// Build a document from bytes and a MIME string.
    pub fn from_mime(bytes: Vec<u8>, mime: &str) -> Result<Self, ExtractionError> {
        Ok(Self::new(bytes, MediaKind::from_mime(mime)?))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn media(&self) -> MediaKind {
        self.media
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the document, yielding its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("media", &self.media)
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a document from a local path or HTTP/HTTPS URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, ExtractionError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<SourceDocument, ExtractionError> {
    let media = MediaKind::from_extension(path_str)?;

    let bytes = tokio::fs::read(path_str).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExtractionError::FileNotFound {
                path: path_str.to_string(),
            }
        } else {
            ExtractionError::Io {
                path: path_str.to_string(),
                source: e,
            }
        }
    })?;

    debug!("Read {} bytes from {} ({})", bytes.len(), path_str, media);
    let name = Path::new(path_str)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    Ok(SourceDocument::new(bytes, media).with_name(name))
}

/// Download a URL into memory. The declared kind comes from the
/// `Content-Type` header, or the URL's extension when the header is absent
/// or generic.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, ExtractionError> {
    info!("Downloading report from: {}", url);

    let failed = |reason: String| ExtractionError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let header_kind = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| MediaKind::from_mime(ct).ok());

    let filename = extract_filename(url);

    let media = match header_kind {
        Some(m) => m,
        None => MediaKind::from_extension(&filename)?,
    };

    let bytes = response
        .bytes()
        .await
        .map_err(|e| failed(e.to_string()))?;

    info!("Downloaded {} bytes ({})", bytes.len(), media);
    Ok(SourceDocument::new(bytes.to_vec(), media).with_name(filename))
}

/// Last path segment of a URL, or a placeholder.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "report".to_string()
}
