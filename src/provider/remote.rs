//! Remote-inference provider: POST the prompt to an arbitrary HTTP endpoint.
//!
//! Intended for self-hosted models behind a thin JSON API. The request body
//! is `{"prompt": …}` plus every caller option; the response body must be the
//! `AnalysisResult` JSON itself.

use crate::error::{AnalysisError, ConfigurationError};
use crate::output::AnalysisResult;
use crate::pipeline::validate;
use crate::provider::{http_client, http_error, parse_endpoint, transport_error};
use crate::provider::{ProviderOptions, ReportProvider};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

const PROVIDER_LABEL: &str = "Remote inference";

/// Calls a configured inference endpoint.
#[derive(Debug, Clone)]
pub struct RemoteInferenceProvider {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl RemoteInferenceProvider {
    pub fn new(endpoint: &str) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client: http_client()?,
            endpoint: parse_endpoint(endpoint)?,
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }
}

/// Caller options first, then `prompt`, so a stray `prompt` option can
/// never replace the rendered prompt.
fn build_body(prompt: &str, options: &ProviderOptions) -> Value {
    let mut body = options.extra.clone();
    body.insert("prompt".to_string(), Value::String(prompt.to_string()));
    Value::Object(body)
}

#[async_trait]
impl ReportProvider for RemoteInferenceProvider {
    fn name(&self) -> &str {
        PROVIDER_LABEL
    }

    async fn analyze(
        &self,
        prompt: &str,
        options: &ProviderOptions,
    ) -> Result<AnalysisResult, AnalysisError> {
        info!("Requesting analysis from {}", self.endpoint);

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&build_body(prompt, options));
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
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
        debug!("Remote inference returned {} bytes", body.len());

        Ok(validate::validate_text(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_merges_options_next_to_prompt() {
        let opts = ProviderOptions::new()
            .with_option("model", json!("llama3.1"))
            .with_option("stream", json!(false));
        assert_eq!(
            build_body("P", &opts),
            json!({"prompt": "P", "model": "llama3.1", "stream": false})
        );
    }

    #[test]
    fn prompt_option_cannot_override_prompt() {
        let opts = ProviderOptions::new().with_option("prompt", json!("injected"));
        assert_eq!(build_body("real", &opts)["prompt"], "real");
    }

    #[test]
    fn credentials_and_headers_stay_out_of_body() {
        let opts = ProviderOptions::new()
            .with_api_key("sk-1")
            .with_header("Authorization", "Bearer x");
        let body = build_body("P", &opts);
        assert_eq!(body, json!({"prompt": "P"}));
    }
}
