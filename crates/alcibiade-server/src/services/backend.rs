use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Remote text-generation provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendChoice {
    Gemini,
    Cloudflare,
}

impl BackendChoice {
    /// Lenient parse of the configured backend name. Anything not
    /// recognised as Cloudflare selects Gemini.
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloudflare" | "cf" | "workers-ai" => BackendChoice::Cloudflare,
            _ => BackendChoice::Gemini,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendChoice::Gemini => "gemini",
            BackendChoice::Cloudflare => "cloudflare",
        }
    }
}

impl std::fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matches 503 / overload / unavailable anywhere in an error message
static TRANSIENT_SIGNATURE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b503\b|overload|unavailable").ok());

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{backend} backend not configured: {reason}")]
    NotConfigured {
        backend: BackendChoice,
        reason: String,
    },

    #[error("[{status}] {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Worth retrying after a backoff
    pub fn is_transient(&self) -> bool {
        let message = self.to_string();
        TRANSIENT_SIGNATURE
            .as_ref()
            .is_some_and(|re| re.is_match(&message))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Network(err.to_string())
    }
}

/// One generation call against a remote provider. The raw response value is
/// returned as-is; shape normalization happens in the dispatcher.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Value, BackendError>;
}
