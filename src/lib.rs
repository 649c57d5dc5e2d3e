//! # bloodreport-analyzer
//!
//! Turn a blood-test report (PDF or scanned image) into a structured,
//! schema-checked summary using a pluggable LLM provider.
//!
//! ## Pipeline Overview
//!
//! ```text
//! report
//!  │
//!  ├─ 1. Input     read local file, download URL, or take bytes + MIME type
//!  ├─ 2. Extract   PDF text layer (lopdf, spawn_blocking) | OCR (tesseract, "eng")
//!  ├─ 3. Prompt    fixed instruction + JSON schema + extracted text
//!  ├─ 4. Provider  chat completion | remote inference | edgequake-llm gateway
//!  └─ 5. Validate  JSON parse, `{…}` recovery, strict schema check
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bloodreport_analyzer::{analyze, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let result = analyze("report.pdf", &config).await?;
//!     println!("{} — {}", result.health_status, result.summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bloodreport` binary (clap + anyhow + tracing-subscriber + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! bloodreport-analyzer = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze, analyze_bytes, analyze_sync, extract_only, ReportAnalyzer};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, ProviderKind};
pub use error::{AnalysisError, ConfigurationError, ExtractionError, ProviderError, ValidationError};
pub use output::{AnalysisResult, HealthStatus, Priority, Supplement};
pub use pipeline::extract::{ExtractedText, Extractor};
pub use pipeline::input::{ImageKind, MediaKind, SourceDocument};
pub use pipeline::ocr::{OcrEngine, TesseractOcr};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use prompts::build_prompt;
pub use provider::{
    resolve_provider, AnalysisRequest, ChatCompletionProvider, LlmGatewayProvider,
    ProviderOptions, RemoteInferenceProvider, ReportProvider,
};
