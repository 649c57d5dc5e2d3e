//! Chat-completion provider (OpenAI-compatible `/v1/chat/completions`).
//!
//! The request is fixed: a JSON-only system instruction, the prompt as the
//! user turn, and temperature 0.2 so repeated runs on the same report give
//! near-identical answers. The answer lives in the first choice's message
//! content and may still carry prose around the JSON; the validator handles
//! that.

use crate::error::{AnalysisError, ConfigurationError, ProviderError};
use crate::output::AnalysisResult;
use crate::pipeline::validate;
use crate::prompts::SYSTEM_INSTRUCTION;
use crate::provider::{http_client, http_error, parse_endpoint, transport_error};
use crate::provider::{ProviderOptions, ReportProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Hosted chat-completion endpoint.
pub const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Model used when none is configured.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Sampling temperature for every analysis request.
pub const CHAT_TEMPERATURE: f32 = 0.2;

/// Environment variable the credential is read from.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const PROVIDER_LABEL: &str = "OpenAI";

/// Calls a chat-completion endpoint with bearer authentication.
#[derive(Debug, Clone)]
pub struct ChatCompletionProvider {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    model: String,
}

impl ChatCompletionProvider {
    /// Provider bound to the hosted endpoint.
    pub fn new(model: impl Into<String>) -> Result<Self, ConfigurationError> {
        Self::with_endpoint(OPENAI_CHAT_ENDPOINT, model)
    }

    /// Provider bound to an OpenAI-compatible endpoint.
    pub fn with_endpoint(
        endpoint: &str,
        model: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client: http_client()?,
            endpoint: parse_endpoint(endpoint)?,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn build_request<'a>(model: &'a str, prompt: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: SYSTEM_INSTRUCTION,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ],
        temperature: CHAT_TEMPERATURE,
    }
}

/// First choice's non-empty message content.
fn first_content(envelope: ChatResponse) -> Option<String> {
    envelope
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
}

fn require_credential(options: &ProviderOptions) -> Result<&str, ConfigurationError> {
    options
        .credential()
        .ok_or_else(|| ConfigurationError::MissingCredential {
            provider: PROVIDER_LABEL.to_string(),
            hint: API_KEY_ENV.to_string(),
        })
}

#[async_trait]
impl ReportProvider for ChatCompletionProvider {
    fn name(&self) -> &str {
        PROVIDER_LABEL
    }

    fn check(&self, options: &ProviderOptions) -> Result<(), ConfigurationError> {
        require_credential(options).map(|_| ())
    }

    async fn analyze(
        &self,
        prompt: &str,
        options: &ProviderOptions,
    ) -> Result<AnalysisResult, AnalysisError> {
        let api_key = require_credential(options)?;

        info!("Requesting analysis from {} ({})", self.endpoint, self.model);
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&build_request(&self.model, prompt))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER_LABEL, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_error(PROVIDER_LABEL, status).into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER_LABEL, e))?;
        let envelope: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse {
                provider: PROVIDER_LABEL.to_string(),
                detail: e.to_string(),
            })?;

        let content = first_content(envelope).ok_or_else(|| ProviderError::NoContent {
            provider: PROVIDER_LABEL.to_string(),
        })?;
        debug!("Chat completion returned {} chars", content.len());

        Ok(validate::validate_text(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_shape() {
        let v = serde_json::to_value(build_request("gpt-4o-mini", "PROMPT")).unwrap();
        assert_eq!(v["model"], "gpt-4o-mini");
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][0]["content"], SYSTEM_INSTRUCTION);
        assert_eq!(v["messages"][1], json!({"role": "user", "content": "PROMPT"}));
        assert!((v["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(v.as_object().unwrap().len(), 3);
    }

    #[test]
    fn content_extraction() {
        let env: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}]
        }))
        .unwrap();
        assert_eq!(first_content(env).as_deref(), Some("{\"a\":1}"));

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(first_content(empty), None);

        let null_content: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))
        .unwrap();
        assert_eq!(first_content(null_content), None);

        let no_choices: ChatResponse = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert_eq!(first_content(no_choices), None);
    }

    #[tokio::test]
    async fn missing_credential_fails_before_io() {
        // Port 9 (discard) on localhost: a request here would fail with a
        // transport error, not a configuration error.
        let provider = ChatCompletionProvider::with_endpoint("http://127.0.0.1:9/v1", "m").unwrap();
        let err = provider
            .analyze("prompt", &ProviderOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Configuration(ConfigurationError::MissingCredential { .. })
        ));
    }

    #[test]
    fn check_requires_non_blank_credential() {
        let provider = ChatCompletionProvider::new("m").unwrap();
        assert!(matches!(
            provider.check(&ProviderOptions::new().with_api_key("  ")),
            Err(ConfigurationError::MissingCredential { .. })
        ));
        assert!(provider
            .check(&ProviderOptions::new().with_api_key("sk-test"))
            .is_ok());
    }

    #[test]
    fn rejects_bad_endpoint() {
        assert!(ChatCompletionProvider::with_endpoint("localhost", "m").is_err());
    }
}
