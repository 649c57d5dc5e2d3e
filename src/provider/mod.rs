//! Provider abstraction: prompt in, validated [`AnalysisResult`] out.
//!
//! Every backend implements [`ReportProvider`]. The orchestrator only sees
//! `&dyn ReportProvider`, so switching from the hosted chat-completion API to
//! a self-hosted inference endpoint (or any `edgequake-llm` provider) is a
//! configuration change, not a code change.
//!
//! Providers make exactly one network call per [`ReportProvider::analyze`].
//! They do not retry and set no timeout; callers that want either wrap the
//! call themselves.

pub mod chat;
pub mod gateway;
pub mod remote;

pub use chat::ChatCompletionProvider;
pub use gateway::LlmGatewayProvider;
pub use remote::RemoteInferenceProvider;

use crate::config::{AnalysisConfig, ProviderKind};
use crate::error::{AnalysisError, ConfigurationError, ProviderError};
use crate::output::AnalysisResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A backend that turns an analysis prompt into a validated result.
#[async_trait]
pub trait ReportProvider: Send + Sync {
    /// Human-readable backend name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Reject options this backend cannot run with. Called before the
    /// document is loaded, so a misconfiguration costs no download or OCR.
    fn check(&self, options: &ProviderOptions) -> Result<(), ConfigurationError> {
        let _ = options;
        Ok(())
    }

    /// Run one analysis. Fails with [`ConfigurationError`] before any I/O
    /// when required options are missing, [`ProviderError`] when the backend
    /// fails, and [`crate::error::ValidationError`] when its answer does not
    /// match the schema.
    async fn analyze(
        &self,
        prompt: &str,
        options: &ProviderOptions,
    ) -> Result<AnalysisResult, AnalysisError>;
}

/// Per-call, provider-specific options.
///
/// `Debug` never prints the API key or header values.
#[derive(Clone, Default)]
pub struct ProviderOptions {
    /// Bearer credential (chat-completion provider).
    pub api_key: Option<String>,
    /// Extra request headers (remote-inference provider).
    pub headers: BTreeMap<String, String>,
    /// Extra JSON body fields merged next to `prompt` (remote-inference provider).
    pub extra: Map<String, Value>,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The API key, if present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

impl fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderOptions")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The prompt plus the options it will be sent with. Built once per call.
pub struct AnalysisRequest<'a> {
    pub prompt: String,
    pub options: &'a ProviderOptions,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(prompt: String, options: &'a ProviderOptions) -> Self {
        Self { prompt, options }
    }

    /// Send this request to `provider`.
    pub async fn send(&self, provider: &dyn ReportProvider) -> Result<AnalysisResult, AnalysisError> {
        debug!(
            "Sending {}-char prompt to {} with {:?}",
            self.prompt.len(),
            provider.name(),
            self.options
        );
        provider.analyze(&self.prompt, self.options).await
    }
}

impl fmt::Debug for AnalysisRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRequest")
            .field("prompt_len", &self.prompt.len())
            .field("options", self.options)
            .finish()
    }
}

/// Build the provider described by `config`.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is.
/// 2. **Remote inference** — requires `config.remote_endpoint`.
/// 3. **Gateway** — an `edgequake-llm` provider by name
///    (`config.gateway_provider`, else `EDGEQUAKE_LLM_PROVIDER`).
/// 4. **Chat completion** (default) — `config.chat_endpoint` or the OpenAI
///    endpoint.
pub fn resolve_provider(
    config: &AnalysisConfig,
) -> Result<Arc<dyn ReportProvider>, ConfigurationError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    match config.provider_kind {
        ProviderKind::Remote => {
            let endpoint = config
                .remote_endpoint
                .as_deref()
                .ok_or(ConfigurationError::MissingEndpoint)?;
            Ok(Arc::new(RemoteInferenceProvider::new(endpoint)?))
        }
        ProviderKind::Gateway => {
            let name = config
                .gateway_provider
                .clone()
                .or_else(|| {
                    std::env::var("EDGEQUAKE_LLM_PROVIDER")
                        .ok()
                        .filter(|v| !v.is_empty())
                })
                .ok_or_else(|| ConfigurationError::GatewayNotConfigured {
                    provider: "(unset)".into(),
                    hint: "Pass --gateway <name> or set EDGEQUAKE_LLM_PROVIDER \
                           (openai, anthropic, gemini, ollama, …)."
                        .into(),
                })?;
            let model = config
                .model
                .as_deref()
                .unwrap_or(chat::DEFAULT_CHAT_MODEL);
            Ok(Arc::new(LlmGatewayProvider::from_name(&name, model)?))
        }
        ProviderKind::Chat => {
            let model = config
                .model
                .as_deref()
                .unwrap_or(chat::DEFAULT_CHAT_MODEL);
            let endpoint = config
                .chat_endpoint
                .as_deref()
                .unwrap_or(chat::OPENAI_CHAT_ENDPOINT);
            Ok(Arc::new(ChatCompletionProvider::with_endpoint(
                endpoint, model,
            )?))
        }
    }
}

/// Shared client construction. No request timeout is set on purpose:
/// bounding latency is the caller's decision.
pub(crate) fn http_client() -> Result<reqwest::Client, ConfigurationError> {
    reqwest::Client::builder()
        .user_agent(concat!("bloodreport-analyzer/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigurationError::Invalid(format!("HTTP client: {e}")))
}

/// Parse and check an endpoint URL.
pub(crate) fn parse_endpoint(url: &str) -> Result<reqwest::Url, ConfigurationError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigurationError::InvalidEndpoint {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ConfigurationError::InvalidEndpoint {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Map a non-success response to [`ProviderError::Http`].
pub(crate) fn http_error(provider: &str, status: reqwest::StatusCode) -> ProviderError {
    ProviderError::Http {
        provider: provider.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
    }
}

pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        provider: provider.to_string(),
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_debug_redacts_secrets() {
        let opts = ProviderOptions::new()
            .with_api_key("sk-live-abcdef")
            .with_header("X-Api-Token", "tok-123")
            .with_option("model", json!("llama3"));
        let dbg = format!("{opts:?}");
        assert!(!dbg.contains("sk-live-abcdef"), "got: {dbg}");
        assert!(!dbg.contains("tok-123"), "got: {dbg}");
        assert!(dbg.contains("X-Api-Token"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn request_debug_redacts_and_hides_prompt() {
        let opts = ProviderOptions::new().with_api_key("sk-secret");
        let req = AnalysisRequest::new("Hemoglobin 13.5".into(), &opts);
        let dbg = format!("{req:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("Hemoglobin"));
    }

    #[test]
    fn blank_credential_is_absent() {
        assert_eq!(ProviderOptions::new().with_api_key("   ").credential(), None);
        assert_eq!(ProviderOptions::new().credential(), None);
        assert_eq!(
            ProviderOptions::new().with_api_key("k").credential(),
            Some("k")
        );
    }

    #[test]
    fn endpoint_validation() {
        assert!(parse_endpoint("http://localhost:11434/api/analyze").is_ok());
        assert!(matches!(
            parse_endpoint("ftp://example.com/x"),
            Err(ConfigurationError::InvalidEndpoint { .. })
        ));
        assert!(parse_endpoint("not a url").is_err());
    }

    #[test]
    fn remote_without_endpoint_is_configuration_error() {
        let config = AnalysisConfig::builder()
            .provider_kind(ProviderKind::Remote)
            .build()
            .unwrap();
        assert!(matches!(
            resolve_provider(&config),
            Err(ConfigurationError::MissingEndpoint)
        ));
    }

    #[test]
    fn default_kind_is_chat() {
        let provider = resolve_provider(&AnalysisConfig::default()).unwrap();
        assert_eq!(provider.name(), "OpenAI");
    }

    #[test]
    fn http_error_uses_canonical_reason() {
        let e = http_error("Remote inference", reqwest::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            e.to_string(),
            "Remote inference API error: 429 Too Many Requests"
        );
    }
}
