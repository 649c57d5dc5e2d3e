//! Error types for the bloodreport-analyzer library.
//!
//! Each pipeline stage owns one error type:
//!
//! * [`ExtractionError`] — the document could not be turned into text
//!   (corrupt PDF, unreadable image, OCR failure, unsupported media type).
//! * [`ConfigurationError`] — the pipeline is not set up to run (missing
//!   credential, missing endpoint, OCR engine not installed). Always raised
//!   before any network call.
//! * [`ProviderError`] — the backing inference service failed (non-success
//!   status, missing content, transport failure).
//! * [`ValidationError`] — the provider answered, but not with JSON matching
//!   the `AnalysisResult` schema.
//!
//! [`AnalysisError`] is the umbrella returned by the orchestrator. Its
//! variants are transparent: whatever a stage raised reaches the caller
//! unmodified, and the caller decides how to phrase it for the user.

use thiserror::Error;

/// Any failure of a single analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl AnalysisError {
    /// True when the backing provider signalled HTTP 429.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AnalysisError::Provider(e) if e.is_rate_limited())
    }
}

/// The document could not be converted to plain text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Report file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: String },

    /// The declared media kind is not one the pipeline accepts.
    #[error("Unsupported media type '{media}'. Accepted: application/pdf, image/png, image/jpeg")]
    UnsupportedMediaType { media: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Reading the document bytes failed.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF is encrypted with a non-empty user password.
    #[error("PDF is password-protected — please provide an unprotected document")]
    Encrypted,

    /// PDF parsed but declares no pages.
    #[error("PDF contains no pages")]
    NoPages,

    // ── Image errors ──────────────────────────────────────────────────────
    /// Image bytes do not decode as the declared format.
    #[error("Image is unreadable: {detail}")]
    UnreadableImage { detail: String },

    /// An image arrived but no OCR engine was set up.
    #[error("No OCR engine configured; image documents cannot be read")]
    OcrUnavailable,

    /// The OCR engine ran but failed.
    #[error("OCR failed: {detail}")]
    Ocr { detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal extraction error: {0}")]
    Internal(String),
}

/// The pipeline is not configured well enough to run.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A credential the provider needs was not supplied.
    #[error("Missing API key for provider '{provider}'.\nSet {hint} in the environment or .env file.")]
    MissingCredential { provider: String, hint: String },

    /// The remote-inference provider has no endpoint.
    #[error("No inference endpoint configured.\nSet BLOODREPORT_ENDPOINT or pass --endpoint.")]
    MissingEndpoint,

    /// An endpoint string is not a valid URL.
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// The OCR engine binary could not be found or run.
    #[error("OCR engine unavailable at '{path}': {reason}\nInstall tesseract or set TESSERACT_PATH.")]
    OcrEngineUnavailable { path: String, reason: String },

    /// A named gateway provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    GatewayNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The backing inference service failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The endpoint answered with a non-success HTTP status.
    #[error("{provider} API error: {status} {reason}")]
    Http {
        provider: String,
        status: u16,
        reason: String,
    },

    /// The request never completed (DNS, TLS, connection reset, …).
    #[error("{provider} request failed: {detail}")]
    Transport { provider: String, detail: String },

    /// The chat-completion envelope could not be decoded.
    #[error("{provider} returned an unexpected response: {detail}")]
    InvalidResponse { provider: String, detail: String },

    /// The chat-completion envelope carried no message content.
    #[error("no content returned from {provider}")]
    NoContent { provider: String },

    /// An edgequake-llm provider returned an error.
    #[error("LLM gateway error: {0}")]
    Gateway(String),
}

impl ProviderError {
    /// HTTP status code, if the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for HTTP 429 Too Many Requests.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

/// The provider response does not match the `AnalysisResult` schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Neither the whole response nor its `{…}` span parsed as JSON.
    #[error("malformed response")]
    Malformed,

    /// The top-level JSON value is not an object.
    #[error("expected a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    /// A required field is absent.
    #[error("missing required field '{path}'")]
    MissingField { path: String },

    /// A field is present with the wrong JSON type.
    #[error("field '{path}' must be {expected}, got {found}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// An enumerated field holds a value outside its enumeration.
    #[error("field '{path}' has invalid value {value:?} (expected one of: {allowed})")]
    InvalidEnum {
        path: String,
        value: String,
        allowed: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display_is_stable() {
        assert_eq!(ValidationError::Malformed.to_string(), "malformed response");
    }

    #[test]
    fn http_error_display_carries_status() {
        let e = ProviderError::Http {
            provider: "Remote inference".into(),
            status: 429,
            reason: "Too Many Requests".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("429"), "got: {msg}");
        assert!(msg.contains("Too Many Requests"), "got: {msg}");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn no_content_display() {
        let e = ProviderError::NoContent {
            provider: "OpenAI".into(),
        };
        assert!(e.to_string().starts_with("no content returned"));
        assert_eq!(e.status(), None);
    }

    #[test]
    fn umbrella_is_transparent() {
        let inner = ValidationError::InvalidEnum {
            path: "healthStatus".into(),
            value: "excellent".into(),
            allowed: "good, attention, concern",
        };
        let expected = inner.to_string();
        let outer: AnalysisError = inner.into();
        assert_eq!(outer.to_string(), expected);
        assert!(!outer.is_rate_limited());
    }

    #[test]
    fn umbrella_rate_limit_passthrough() {
        let outer: AnalysisError = ProviderError::Http {
            provider: "OpenAI".into(),
            status: 429,
            reason: "Too Many Requests".into(),
        }
        .into();
        assert!(outer.is_rate_limited());
    }

    #[test]
    fn missing_credential_mentions_variable() {
        let e = ConfigurationError::MissingCredential {
            provider: "openai".into(),
            hint: "OPENAI_API_KEY".into(),
        };
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }
}
