//! OCR for image documents.
//!
//! [`OcrEngine`] is the seam: the extractor only needs "bytes in, transcript
//! out". [`TesseractOcr`] drives the `tesseract` command-line tool, which
//! reads its input from a file, so the image is written to a
//! [`tempfile::NamedTempFile`] that lives exactly as long as the recognition
//! call and is deleted on every exit path.
//!
//! Locating the binary is an explicit setup step ([`TesseractOcr::locate`])
//! done once by the caller, not a lazily-initialised global.

use crate::error::{ConfigurationError, ExtractionError};
use crate::pipeline::input::ImageKind;
use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Default recognition language (tesseract traineddata name).
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Turns image bytes into a best-effort transcript.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine identifier for logs.
    fn name(&self) -> &str;

    /// Recognise text in `image`. The transcript is returned as produced,
    /// noise included.
    async fn recognize(
        &self,
        image: &[u8],
        kind: ImageKind,
        language: &str,
    ) -> Result<String, ExtractionError>;
}

/// The `tesseract` CLI as an [`OcrEngine`].
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    version: String,
}

impl TesseractOcr {
    /// Find and probe the tesseract binary.
    ///
    /// Resolution order: `path` argument, `TESSERACT_PATH`, then `tesseract`
    /// on `PATH`. The binary is run once with `--version` to prove it works.
    pub async fn locate(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let binary = path
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::var_os("TESSERACT_PATH")
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from("tesseract"));

        let unavailable = |reason: String| ConfigurationError::OcrEngineUnavailable {
            path: binary.display().to_string(),
            reason,
        };

        let output = Command::new(&binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(unavailable(format!("`--version` exited with {}", output.status)));
        }

        // tesseract 3.x prints its banner on stderr, 4.x+ on stdout.
        let banner = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let version = String::from_utf8_lossy(banner)
            .lines()
            .next()
            .unwrap_or("tesseract")
            .trim()
            .to_string();

        info!("OCR engine ready: {} ({})", version, binary.display());
        Ok(Self { binary, version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(
        &self,
        image: &[u8],
        kind: ImageKind,
        language: &str,
    ) -> Result<String, ExtractionError> {
        let scratch = tempfile::Builder::new()
            .prefix("bloodreport-ocr-")
            .suffix(&format!(".{}", kind.extension()))
            .tempfile()
            .map_err(|e| ExtractionError::Internal(format!("tempfile: {e}")))?;

        tokio::fs::write(scratch.path(), image)
            .await
            .map_err(|e| ExtractionError::Internal(format!("tempfile write: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(scratch.path())
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        // Release the scratch file before inspecting the outcome.
        drop(scratch);

        let output = output.map_err(|e| ExtractionError::Ocr {
            detail: format!("failed to run {}: {}", self.binary.display(), e),
        })?;

        if !output.status.success() {
            return Err(ExtractionError::Ocr {
                detail: format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("OCR produced {} chars", text.len());
        Ok(text)
    }
}

/// Check that `bytes` decode as an image header; returns its dimensions.
pub fn probe_image(bytes: &[u8]) -> Result<(u32, u32), ExtractionError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ExtractionError::UnreadableImage {
            detail: e.to_string(),
        })?
        .into_dimensions()
        .map_err(|e| ExtractionError::UnreadableImage {
            detail: e.to_string(),
        })
}
