//! Backend dispatch with retry
//!
//! Gemini calls are retried on transient failures (503 / overload /
//! unavailable) with exponential backoff plus jitter. Cloudflare gets a
//! single attempt. Every successful payload is normalized to plain text.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::backend::{BackendChoice, BackendError, GenerationBackend};
use super::cloudflare::CloudflareService;
use super::gemini::GeminiService;
use super::status::StatusSink;
use crate::config::{RetryConfig, Settings};
use crate::utils::SharedRng;

/// Returned when no known text field exists in a backend payload
pub const DIAGNOSTIC_PLACEHOLDER: &str =
    "Received an unexpected response format from the AI service.";

/// JSON pointers probed after the direct-string case, first string wins
const TEXT_PROBES: &[&str] = &[
    "/response/text",
    "/text",
    "/response/candidates/0/content/parts/0/text",
    "/candidates/0/content/parts/0/text",
];

/// Caps the exponent so the delay arithmetic cannot overflow
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(attempt-1) + uniform(0..=max_jitter)`, attempt is 1-based
    pub fn backoff(&self, attempt: u32, rng: &SharedRng) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter_ms = rng.up_to(self.max_jitter.as_millis() as u64);
        Duration::from_millis(base_ms.saturating_mul(1u64 << exponent).saturating_add(jitter_ms))
    }
}

/// Successful generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub backend: BackendChoice,
    pub attempts: u32,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0} backend not configured")]
    NotConfigured(BackendChoice),

    #[error("{backend} still failing after {attempts} attempts: {source}")]
    Exhausted {
        backend: BackendChoice,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("{backend} request failed: {source}")]
    Permanent {
        backend: BackendChoice,
        #[source]
        source: BackendError,
    },
}

#[derive(Clone)]
pub struct RequestDispatcher {
    gemini: Option<Arc<dyn GenerationBackend>>,
    cloudflare: Option<Arc<dyn GenerationBackend>>,
    retry: RetryPolicy,
    rng: SharedRng,
}

impl RequestDispatcher {
    pub fn new(retry: RetryPolicy, rng: SharedRng) -> Self {
        Self {
            gemini: None,
            cloudflare: None,
            retry,
            rng,
        }
    }

    pub fn with_gemini(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.gemini = Some(backend);
        self
    }

    pub fn with_cloudflare(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.cloudflare = Some(backend);
        self
    }

    /// Wire the HTTP backends whose credentials are present
    pub fn from_settings(settings: &Settings, rng: SharedRng) -> Self {
        let timeout = settings.request_timeout();
        let mut dispatcher = Self::new(RetryPolicy::from(&settings.retry), rng);

        match GeminiService::from_config(&settings.gemini, timeout) {
            Some(service) => {
                info!("Gemini backend ready (model={})", service.model());
                dispatcher = dispatcher.with_gemini(Arc::new(service));
            }
            None => info!("Gemini backend disabled: no API key"),
        }

        match CloudflareService::from_config(&settings.cloudflare, timeout) {
            Some(service) => {
                info!("Cloudflare backend ready (model={})", service.model());
                dispatcher = dispatcher.with_cloudflare(Arc::new(service));
            }
            None => info!("Cloudflare backend disabled: missing token or account id"),
        }

        dispatcher
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn is_configured(&self, choice: BackendChoice) -> bool {
        self.backend(choice).is_some()
    }

    fn backend(&self, choice: BackendChoice) -> Option<&Arc<dyn GenerationBackend>> {
        match choice {
            BackendChoice::Gemini => self.gemini.as_ref(),
            BackendChoice::Cloudflare => self.cloudflare.as_ref(),
        }
    }

    pub async fn dispatch(
        &self,
        prompt: &str,
        choice: BackendChoice,
        status: &dyn StatusSink,
    ) -> Result<Generation, DispatchError> {
        let backend = self
            .backend(choice)
            .ok_or(DispatchError::NotConfigured(choice))?;

        match choice {
            BackendChoice::Gemini => self.dispatch_with_retry(backend.as_ref(), prompt, status).await,
            BackendChoice::Cloudflare => dispatch_once(backend.as_ref(), choice, prompt).await,
        }
    }

    async fn dispatch_with_retry(
        &self,
        backend: &dyn GenerationBackend,
        prompt: &str,
        status: &dyn StatusSink,
    ) -> Result<Generation, DispatchError> {
        let choice = BackendChoice::Gemini;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match backend.generate(prompt).await {
                Ok(raw) => {
                    return Ok(Generation {
                        text: normalize_response(&raw),
                        backend: choice,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt, &self.rng);
                    let message = format!(
                        "Model overloaded, retrying in {}s (attempt {}/{})…",
                        ceil_secs(delay),
                        attempt + 1,
                        max_attempts
                    );
                    warn!(
                        backend = %choice,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient backend failure, backing off"
                    );
                    status.notify(&message);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    warn!(backend = %choice, attempts = attempt, error = %err, "Retries exhausted");
                    return Err(DispatchError::Exhausted {
                        backend: choice,
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(backend = %choice, attempt, error = %err, "Permanent backend failure");
                    return Err(DispatchError::Permanent {
                        backend: choice,
                        source: err,
                    });
                }
            }
        }
    }
}

async fn dispatch_once(
    backend: &dyn GenerationBackend,
    choice: BackendChoice,
    prompt: &str,
) -> Result<Generation, DispatchError> {
    match backend.generate(prompt).await {
        Ok(raw) => Ok(Generation {
            text: normalize_response(&raw),
            backend: choice,
            attempts: 1,
        }),
        Err(err) => {
            warn!(backend = %choice, error = %err, "Backend call failed");
            if err.is_transient() {
                Err(DispatchError::Exhausted {
                    backend: choice,
                    attempts: 1,
                    source: err,
                })
            } else {
                Err(DispatchError::Permanent {
                    backend: choice,
                    source: err,
                })
            }
        }
    }
}

fn ceil_secs(delay: Duration) -> u128 {
    delay.as_millis().div_ceil(1000)
}

/// Extract the reply text from any of the known payload shapes
pub fn normalize_response(raw: &Value) -> String {
    if let Some(text) = raw.as_str() {
        return text.trim().to_string();
    }

    for probe in TEXT_PROBES {
        if let Some(text) = raw.pointer(probe).and_then(Value::as_str) {
            return text.trim().to_string();
        }
    }

    warn!(raw = %raw, "Unexpected response format");
    DIAGNOSTIC_PLACEHOLDER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::MockGenerationBackend;
    use parking_lot::Mutex;
    use serde_json::json;

    fn overloaded() -> BackendError {
        BackendError::Http {
            status: 503,
            body: "The model is overloaded.".to_string(),
        }
    }

    fn gemini_reply(text: &str) -> Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    fn dispatcher_with(mock: MockGenerationBackend) -> RequestDispatcher {
        RequestDispatcher::new(RetryPolicy::default(), SharedRng::seeded(3)).with_gemini(Arc::new(mock))
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink_messages = messages.clone();
        (messages, move |m: &str| sink_messages.lock().push(m.to_string()))
    }

    #[test]
    fn test_backoff_bounds() {
        let policy = RetryPolicy::default();
        let rng = SharedRng::seeded(11);
        for attempt in 1..=3u32 {
            let floor = 1000 * 2u128.pow(attempt - 1);
            for _ in 0..50 {
                let ms = policy.backoff(attempt, &rng).as_millis();
                assert!(ms >= floor && ms <= floor + 250, "attempt {} gave {}ms", attempt, ms);
            }
        }
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let policy = RetryPolicy::default();
        let rng = SharedRng::seeded(1);
        assert!(policy.backoff(u32::MAX, &rng) >= Duration::from_millis(1000));
    }

    #[test]
    fn test_normalize_probes_in_order() {
        assert_eq!(normalize_response(&json!("  direct  ")), "direct");
        assert_eq!(normalize_response(&json!({"response": {"text": "a"}})), "a");
        assert_eq!(normalize_response(&json!({"text": "b"})), "b");
        assert_eq!(
            normalize_response(&json!({"response": {"candidates": [{"content": {"parts": [{"text": "c"}]}}]}})),
            "c"
        );
        assert_eq!(normalize_response(&gemini_reply(" d\n")), "d");
        // earlier probe wins
        assert_eq!(
            normalize_response(&json!({"text": "first", "candidates": [{"content": {"parts": [{"text": "second"}]}}]})),
            "first"
        );
    }

    #[test]
    fn test_normalize_unknown_shape() {
        assert_eq!(normalize_response(&json!({"foo": 1})), DIAGNOSTIC_PLACEHOLDER);
        // non-string text field is not accepted
        assert_eq!(normalize_response(&json!({"text": 42})), DIAGNOSTIC_PLACEHOLDER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_overloads_then_success() {
        let mut mock = MockGenerationBackend::new();
        let mut calls = 0;
        mock.expect_generate().times(3).returning(move |_| {
            calls += 1;
            if calls < 3 {
                Err(overloaded())
            } else {
                Ok(gemini_reply("Ah... le vin."))
            }
        });

        let (messages, sink) = recorder();
        let generation = dispatcher_with(mock)
            .dispatch("prompt", BackendChoice::Gemini, &sink)
            .await
            .unwrap();

        assert_eq!(generation.text, "Ah... le vin.");
        assert_eq!(generation.attempts, 3);

        let messages = messages.lock();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("Model overloaded, retrying in "));
        assert!(messages[0].ends_with("(attempt 2/3)…"));
        assert!(messages[1].ends_with("(attempt 3/3)…"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_generate().times(3).returning(|_| Err(overloaded()));

        let (messages, sink) = recorder();
        let err = dispatcher_with(mock)
            .dispatch("prompt", BackendChoice::Gemini, &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Exhausted { attempts: 3, .. }));
        assert_eq!(messages.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_generate().times(1).returning(|_| {
            Err(BackendError::Http {
                status: 401,
                body: "API key not valid".to_string(),
            })
        });

        let (messages, sink) = recorder();
        let err = dispatcher_with(mock)
            .dispatch("prompt", BackendChoice::Gemini, &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Permanent { .. }));
        assert!(messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_not_configured() {
        let dispatcher = RequestDispatcher::new(RetryPolicy::default(), SharedRng::seeded(1));
        assert!(!dispatcher.is_configured(BackendChoice::Gemini));

        let (_, sink) = recorder();
        let err = dispatcher
            .dispatch("prompt", BackendChoice::Cloudflare, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotConfigured(BackendChoice::Cloudflare)));
    }

    #[tokio::test]
    async fn test_cloudflare_single_attempt() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_generate().times(1).returning(|_| Err(overloaded()));

        let dispatcher = RequestDispatcher::new(RetryPolicy::default(), SharedRng::seeded(1))
            .with_cloudflare(Arc::new(mock));
        let (messages, sink) = recorder();
        let err = dispatcher
            .dispatch("prompt", BackendChoice::Cloudflare, &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Exhausted { attempts: 1, .. }));
        assert!(messages.lock().is_empty());
    }
}
