//! Orchestration: document in, validated [`AnalysisResult`] out.
//!
//! [`ReportAnalyzer::analyze_report`] is the core: extract, build the
//! prompt, call the provider. Stages run strictly in order, nothing is
//! retried, and whatever a stage raises reaches the caller unchanged.
//!
//! The free functions ([`analyze`], [`analyze_bytes`], [`analyze_sync`],
//! [`extract_only`]) wire an [`AnalysisConfig`] into that core.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::output::AnalysisResult;
use crate::pipeline::extract::{ExtractedText, Extractor};
use crate::pipeline::input::{self, MediaKind, SourceDocument};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr};
use crate::progress::{ProgressCallback, Stage};
use crate::prompts;
use crate::provider::{self, AnalysisRequest, ProviderOptions, ReportProvider};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs the extract → prompt → provider sequence for one document at a time.
///
/// Holds no per-call state; one instance can serve concurrent independent
/// analyses.
#[derive(Clone, Default)]
pub struct ReportAnalyzer {
    extractor: Extractor,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for ReportAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportAnalyzer")
            .field("extractor", &self.extractor)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ReportAnalyzer {
    pub fn new(extractor: Extractor) -> Self {
        Self {
            extractor,
            progress: None,
        }
    }

    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    /// Build an analyzer able to read documents of kind `media`.
    ///
    /// An OCR engine is only located when `media` is an image, so PDF-only
    /// hosts need no tesseract install.
    pub async fn for_media(config: &AnalysisConfig, media: MediaKind) -> Result<Self, AnalysisError> {
        let mut extractor = Extractor::new().with_language(config.ocr_language.clone());
        if let MediaKind::Image(_) = media {
            let engine: Arc<dyn OcrEngine> = match config.ocr_engine {
                Some(ref engine) => Arc::clone(engine),
                None => Arc::new(TesseractOcr::locate(config.tesseract_path.as_deref()).await?),
            };
            extractor = extractor.with_ocr(engine);
        }

        let mut analyzer = Self::new(extractor);
        if let Some(ref cb) = config.progress_callback {
            analyzer = analyzer.with_progress(Arc::clone(cb));
        }
        Ok(analyzer)
    }

    /// Extract the document's text only.
    pub async fn extract(&self, doc: SourceDocument) -> Result<ExtractedText, AnalysisError> {
        self.stage_start(Stage::Extract);
        let result = self.extractor.extract(doc).await.map_err(AnalysisError::from);
        self.stage_end(Stage::Extract, &result, |t| t.as_str().len());
        result
    }

    /// Analyze one document with `provider`.
    ///
    /// The extracted text is traced at debug level before the provider call.
    /// `options` are handed to the provider untouched and never logged.
    pub async fn analyze_report(
        &self,
        doc: SourceDocument,
        provider: &dyn ReportProvider,
        options: &ProviderOptions,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        let text = self.extract(doc).await?;
        debug!("Extracted text ({} chars):\n{}", text.as_str().len(), text);

        let request = AnalysisRequest::new(prompts::build_prompt(text.as_str()), options);

        self.stage_start(Stage::Analyze);
        let result = request.send(provider).await;
        self.stage_end(Stage::Analyze, &result, |r| {
            serde_json::to_string(r).map(|s| s.len()).unwrap_or(0)
        });
        let result = result?;

        info!(
            "Analysis complete via {} in {}ms: health status {}, {} supplement(s)",
            provider.name(),
            started.elapsed().as_millis(),
            result.health_status,
            result.supplements.len()
        );
        Ok(result)
    }

    fn stage_start(&self, stage: Stage) {
        if let Some(ref cb) = self.progress {
            cb.on_stage_start(stage);
        }
    }

    fn stage_end<T>(
        &self,
        stage: Stage,
        result: &Result<T, AnalysisError>,
        output_len: impl FnOnce(&T) -> usize,
    ) {
        if let Some(ref cb) = self.progress {
            match result {
                Ok(v) => cb.on_stage_complete(stage, output_len(v)),
                Err(e) => cb.on_stage_error(stage, &e.to_string()),
            }
        }
    }
}

/// Analyze a blood report at a local path or HTTP/HTTPS URL.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// - [`AnalysisError::Configuration`] — provider or OCR engine not set up,
///   missing credential. Provider options are checked before the input is
///   read or downloaded.
/// - [`AnalysisError::Extraction`] — unreadable input document.
/// - [`AnalysisError::Provider`] — the provider call failed (check
///   [`AnalysisError::is_rate_limited`] for 429).
/// - [`AnalysisError::Validation`] — the provider's answer was not a valid
///   `AnalysisResult`.
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, AnalysisError> {
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);

    let provider = provider::resolve_provider(config)?;
    let options = preflight(provider.as_ref(), config)?;
    let doc = load(input_str, config).await?;
    run(doc, provider.as_ref(), &options, config).await
}

/// Analyze a report already in memory, declared by its MIME type.
///
/// # Example
/// ```rust,no_run
/// use bloodreport_analyzer::{analyze_bytes, AnalysisConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("report.pdf")?;
/// let config = AnalysisConfig::builder().api_key("sk-…").build()?;
/// let result = analyze_bytes(bytes, "application/pdf", &config).await?;
/// println!("{}", result.summary);
/// # Ok(())
/// # }
/// ```
pub async fn analyze_bytes(
    bytes: Vec<u8>,
    mime: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, AnalysisError> {
    let doc = SourceDocument::from_mime(bytes, mime)?;
    let provider = provider::resolve_provider(config)?;
    let options = preflight(provider.as_ref(), config)?;
    run(doc, provider.as_ref(), &options, config).await
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, AnalysisError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| {
            crate::error::ExtractionError::Internal(format!("Failed to create tokio runtime: {e}"))
        })?
        .block_on(analyze(input_str, config))
}

/// Extract a report's text without analyzing it.
///
/// Does not require a provider or API key.
pub async fn extract_only(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<ExtractedText, AnalysisError> {
    let doc = load(input_str.as_ref(), config).await?;
    let analyzer = ReportAnalyzer::for_media(config, doc.media()).await?;
    analyzer.extract(doc).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn load(input_str: &str, config: &AnalysisConfig) -> Result<SourceDocument, AnalysisError> {
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Load);
    }
    let result = input::resolve_input(input_str, config.download_timeout_secs).await;
    if let Some(cb) = cb {
        match &result {
            Ok(doc) => cb.on_stage_complete(Stage::Load, doc.len()),
            Err(e) => cb.on_stage_error(Stage::Load, &e.to_string()),
        }
    }
    Ok(result?)
}

/// Provider options, vetted by the provider before any document I/O.
fn preflight(
    provider: &dyn ReportProvider,
    config: &AnalysisConfig,
) -> Result<ProviderOptions, AnalysisError> {
    let options = config.provider_options();
    provider.check(&options)?;
    Ok(options)
}

async fn run(
    doc: SourceDocument,
    provider: &dyn ReportProvider,
    options: &ProviderOptions,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, AnalysisError> {
    let analyzer = ReportAnalyzer::for_media(config, doc.media()).await?;
    analyzer.analyze_report(doc, provider, options).await
}
