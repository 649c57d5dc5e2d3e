//! Configuration types for blood-report analysis.
//!
//! Every knob lives in [`AnalysisConfig`], built via
//! [`AnalysisConfigBuilder`]. The config carries the credential, so its
//! `Debug` impl is hand-written and never prints it.

use crate::error::ConfigurationError;
use crate::pipeline::ocr::{OcrEngine, DEFAULT_LANGUAGE};
use crate::progress::ProgressCallback;
use crate::provider::{self, ProviderOptions, ReportProvider};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Which provider implementation [`provider::resolve_provider`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// OpenAI-compatible chat completion (default).
    #[default]
    Chat,
    /// Self-hosted endpoint taking `{"prompt": …}`.
    Remote,
    /// Any `edgequake-llm` provider, selected by name.
    Gateway,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Chat => "chat",
            ProviderKind::Remote => "remote",
            ProviderKind::Gateway => "gateway",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "openai" => Ok(ProviderKind::Chat),
            "remote" | "open-source" | "opensource" => Ok(ProviderKind::Remote),
            "gateway" => Ok(ProviderKind::Gateway),
            other => Err(format!(
                "unknown provider kind '{other}' (expected chat, remote or gateway)"
            )),
        }
    }
}

/// Configuration for one or many analysis runs.
///
/// Built via [`AnalysisConfig::builder()`] or [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use bloodreport_analyzer::{AnalysisConfig, ProviderKind};
///
/// let config = AnalysisConfig::builder()
///     .provider_kind(ProviderKind::Remote)
///     .remote_endpoint("http://localhost:11434/api/analyze")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Provider implementation to build. Default: [`ProviderKind::Chat`].
    pub provider_kind: ProviderKind,

    /// Model identifier. If None, the chat default (`gpt-4o-mini`) is used.
    pub model: Option<String>,

    /// Override for the chat-completion endpoint (OpenAI-compatible servers).
    pub chat_endpoint: Option<String>,

    /// Endpoint for [`ProviderKind::Remote`]. Required for that kind.
    pub remote_endpoint: Option<String>,

    /// `edgequake-llm` provider name for [`ProviderKind::Gateway`].
    pub gateway_provider: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_kind`.
    pub provider: Option<Arc<dyn ReportProvider>>,

    /// Credential for the chat-completion provider.
    pub api_key: Option<String>,

    /// Extra request headers for the remote provider.
    pub headers: BTreeMap<String, String>,

    /// Extra JSON body fields for the remote provider.
    pub extra_options: Map<String, Value>,

    /// OCR language. Default: `eng`.
    pub ocr_language: String,

    /// Explicit tesseract binary. If None, `TESSERACT_PATH` then `PATH`.
    pub tesseract_path: Option<PathBuf>,

    /// Pre-constructed OCR engine. Takes precedence over `tesseract_path`.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional stage-progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider_kind: ProviderKind::default(),
            model: None,
            chat_endpoint: None,
            remote_endpoint: None,
            gateway_provider: None,
            provider: None,
            api_key: None,
            headers: BTreeMap::new(),
            extra_options: Map::new(),
            ocr_language: DEFAULT_LANGUAGE.to_string(),
            tesseract_path: None,
            ocr_engine: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("provider_kind", &self.provider_kind)
            .field("model", &self.model)
            .field("chat_endpoint", &self.chat_endpoint)
            .field("remote_endpoint", &self.remote_endpoint)
            .field("gateway_provider", &self.gateway_provider)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("extra_options", &self.extra_options.keys().collect::<Vec<_>>())
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_path", &self.tesseract_path)
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|e| e.name().to_string()))
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The per-call options handed to the provider.
    pub fn provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            api_key: self.api_key.clone(),
            headers: self.headers.clone(),
            extra: self.extra_options.clone(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn provider_kind(mut self, kind: ProviderKind) -> Self {
        self.config.provider_kind = kind;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn chat_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.chat_endpoint = Some(url.into());
        self
    }

    pub fn remote_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.remote_endpoint = Some(url.into());
        self
    }

    pub fn gateway_provider(mut self, name: impl Into<String>) -> Self {
        self.config.gateway_provider = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ReportProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn extra_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.extra_options.insert(key.into(), value);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = Some(path.into());
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ConfigurationError> {
        let c = &self.config;
        if let Some(ref url) = c.remote_endpoint {
            provider::parse_endpoint(url)?;
        }
        if let Some(ref url) = c.chat_endpoint {
            provider::parse_endpoint(url)?;
        }
        if c.ocr_language.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "OCR language must not be empty".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(ConfigurationError::Invalid(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let c = AnalysisConfig::default();
        assert_eq!(c.provider_kind, ProviderKind::Chat);
        assert_eq!(c.ocr_language, "eng");
        assert_eq!(c.download_timeout_secs, 120);
        assert!(c.provider.is_none());
        assert!(c.api_key.is_none());
    }

    #[test]
    fn debug_never_prints_credentials() {
        let c = AnalysisConfig::builder()
            .api_key("sk-very-secret")
            .header("X-Token", "header-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-very-secret"), "got: {dbg}");
        assert!(!dbg.contains("header-secret"), "got: {dbg}");
        assert!(dbg.contains("X-Token"));
    }

    #[test]
    fn build_rejects_bad_remote_endpoint() {
        let err = AnalysisConfig::builder()
            .remote_endpoint("localhost:11434")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidEndpoint { .. }));
    }

    #[test]
    fn build_rejects_empty_language_and_zero_timeout() {
        assert!(AnalysisConfig::builder().ocr_language(" ").build().is_err());
        assert!(AnalysisConfig::builder()
            .download_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn provider_options_carry_config() {
        let c = AnalysisConfig::builder()
            .api_key("k")
            .header("X-A", "1")
            .extra_option("model", json!("llama3"))
            .build()
            .unwrap();
        let opts = c.provider_options();
        assert_eq!(opts.credential(), Some("k"));
        assert_eq!(opts.headers.get("X-A").map(String::as_str), Some("1"));
        assert_eq!(opts.extra.get("model"), Some(&json!("llama3")));
    }

    #[test]
    fn provider_kind_parsing() {
        assert_eq!("chat".parse::<ProviderKind>(), Ok(ProviderKind::Chat));
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::Chat));
        assert_eq!("remote".parse::<ProviderKind>(), Ok(ProviderKind::Remote));
        assert_eq!("gateway".parse::<ProviderKind>(), Ok(ProviderKind::Gateway));
        assert!("bard".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Remote.to_string(), "remote");
    }
}
