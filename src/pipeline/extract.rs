//! Document extraction: [`SourceDocument`] → [`ExtractedText`].
//!
//! Dispatch is decided by the document's declared media kind alone. Exactly
//! one branch runs; a failed PDF parse is never retried as OCR, nor the
//! other way round.

use crate::error::ExtractionError;
use crate::pipeline::input::{MediaKind, SourceDocument};
use crate::pipeline::ocr::{self, OcrEngine, DEFAULT_LANGUAGE};
use crate::pipeline::pdf;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Plain text extracted from one document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedText(String);

impl ExtractedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts documents to text. Holds no per-document state, so one instance
/// can serve concurrent independent analyses.
#[derive(Clone)]
pub struct Extractor {
    ocr: Option<Arc<dyn OcrEngine>>,
    language: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            ocr: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("ocr", &self.ocr.as_ref().map(|e| e.name().to_string()))
            .field("language", &self.language)
            .finish()
    }
}

impl Extractor {
    /// An extractor for PDFs only; images fail with
    /// [`ExtractionError::OcrUnavailable`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an OCR engine for image documents.
    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// OCR language (tesseract traineddata name). Default: `eng`.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Extract the document's text, consuming the document.
    pub async fn extract(&self, doc: SourceDocument) -> Result<ExtractedText, ExtractionError> {
        let media = doc.media();
        info!(
            "Extracting {} ({}, {} bytes)",
            doc.name().unwrap_or("document"),
            media,
            doc.len()
        );

        let text = match media {
            MediaKind::Pdf => pdf::extract_pdf_text(doc.into_bytes()).await?,
            MediaKind::Image(kind) => {
                let engine = self.ocr.as_ref().ok_or(ExtractionError::OcrUnavailable)?;
                let bytes = doc.into_bytes();
                let (w, h) = ocr::probe_image(&bytes)?;
                debug!("Image {}x{} px → {}", w, h, engine.name());
                engine.recognize(&bytes, kind, &self.language).await?
            }
        };

        debug!("Extracted {} chars", text.len());
        Ok(ExtractedText(text))
    }
}
