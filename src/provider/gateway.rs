//! Adapter exposing any `edgequake-llm` provider as a [`ReportProvider`].
//!
//! `edgequake-llm` already knows how to talk to Anthropic, Gemini, Azure,
//! Ollama, LM Studio and others. Wrapping it keeps those backends available
//! without a bespoke HTTP client per vendor. The messages sent mirror the
//! chat-completion provider exactly.

use crate::error::{AnalysisError, ConfigurationError, ProviderError};
use crate::output::AnalysisResult;
use crate::pipeline::validate;
use crate::prompts::SYSTEM_INSTRUCTION;
use crate::provider::chat::CHAT_TEMPERATURE;
use crate::provider::{ProviderOptions, ReportProvider};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A `ReportProvider` backed by an `edgequake-llm` provider.
pub struct LlmGatewayProvider {
    inner: Arc<dyn LLMProvider>,
    label: String,
}

impl LlmGatewayProvider {
    /// Wrap an already-configured provider.
    pub fn new(inner: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }

    /// Instantiate a named provider (`openai`, `anthropic`, `gemini`, …).
    ///
    /// The factory reads the vendor's API key from its usual environment
    /// variable; a missing key surfaces here, before any request.
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, ConfigurationError> {
        let inner = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ConfigurationError::GatewayNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(inner, format!("{provider_name}:{model}")))
    }
}

impl fmt::Debug for LlmGatewayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmGatewayProvider")
            .field("label", &self.label)
            .field("inner", &"<dyn LLMProvider>")
            .finish()
    }
}

#[async_trait]
impl ReportProvider for LlmGatewayProvider {
    fn name(&self) -> &str {
        &self.label
    }

    async fn analyze(
        &self,
        prompt: &str,
        _options: &ProviderOptions,
    ) -> Result<AnalysisResult, AnalysisError> {
        let messages = vec![ChatMessage::system(SYSTEM_INSTRUCTION), ChatMessage::user(prompt)];
        let options = CompletionOptions {
            temperature: Some(CHAT_TEMPERATURE),
            ..Default::default()
        };

        info!("Requesting analysis from gateway provider {}", self.label);
        let response = self
            .inner
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ProviderError::Gateway(format!("{}: {}", self.label, e)))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(ProviderError::NoContent {
                provider: self.label.clone(),
            }
            .into());
        }

        Ok(validate::validate_text(&response.content)?)
    }
}
