use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::backend::{BackendChoice, BackendError, GenerationBackend};
use crate::config::CloudflareConfig;

/// Workers AI text generation (single attempt, no retry)
#[derive(Clone)]
pub struct CloudflareService {
    client: Client,
    auth: String,
    account_id: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    prompt: &'a str,
    raw: bool,
    stream: bool,
    max_tokens: u32,
}

/// `{ success, result: { response } }`
#[derive(Deserialize)]
struct RunEnvelope {
    result: RunResult,
}

#[derive(Deserialize)]
struct RunResult {
    response: String,
}

impl CloudflareService {
    /// `None` unless both the token and the account id are configured
    pub fn from_config(config: &CloudflareConfig, timeout: Duration) -> Option<Self> {
        let auth = config.auth()?.to_string();
        let account_id = config.account_id()?.to_string();
        Some(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            auth,
            account_id,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `{base}/client/v4/accounts/{account}/ai/run/{model}` with the model
    /// encoded as a single path segment
    fn endpoint(&self) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| BackendError::NotConfigured {
            backend: BackendChoice::Cloudflare,
            reason: format!("invalid base url: {}", e),
        })?;
        url.path_segments_mut()
            .map_err(|_| BackendError::NotConfigured {
                backend: BackendChoice::Cloudflare,
                reason: "base url cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend([
                "client",
                "v4",
                "accounts",
                self.account_id.as_str(),
                "ai",
                "run",
                self.model.as_str(),
            ]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for CloudflareService {
    async fn generate(&self, prompt: &str) -> Result<Value, BackendError> {
        let request = RunRequest {
            prompt,
            raw: true,
            stream: false,
            max_tokens: self.max_tokens,
        };

        debug!(backend = %BackendChoice::Cloudflare, model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(self.endpoint()?)
            .bearer_auth(&self.auth)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http { status, body });
        }

        let raw = response.text().await?;
        let envelope: RunEnvelope = serde_json::from_str(&raw).map_err(|e| {
            BackendError::MalformedResponse(format!("Invalid JSON from Cloudflare: {}", e))
        })?;

        Ok(Value::String(envelope.result.response))
    }
}
