use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::backend::{BackendChoice, BackendError, GenerationBackend};
use crate::config::GeminiConfig;

const TEMPERATURE: f32 = 0.7;
const TOP_K: u32 = 40;

#[derive(Clone)]
pub struct GeminiService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_output_tokens: u32,
}

// Request Structures
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_k: u32,
}

impl GeminiService {
    /// `None` when no API key is configured
    pub fn from_config(config: &GeminiConfig, timeout: Duration) -> Option<Self> {
        let api_key = config.api_key()?.to_string();
        Some(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait::async_trait]
impl GenerationBackend for GeminiService {
    async fn generate(&self, prompt: &str) -> Result<Value, BackendError> {
        let request = GenerateContentRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                temperature: TEMPERATURE,
                top_k: TOP_K,
            },
        };

        debug!(backend = %BackendChoice::Gemini, model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http { status, body });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::MalformedResponse(format!("Gemini body is not JSON: {}", e)))
    }
}
