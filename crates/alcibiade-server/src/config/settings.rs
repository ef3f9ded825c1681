use anyhow::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::services::backend::BackendChoice;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CLOUDFLARE_BASE_URL: &str = "https://api.cloudflare.com";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub ai: AiConfig,
    pub gemini: GeminiConfig,
    pub cloudflare: CloudflareConfig,
    pub conversation: ConversationSettings,
    #[serde(default)]
    pub persona: PersonaConfig,
    pub ipc: IpcConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    /// Fixed seed for template picks and retry jitter (tests, demos)
    #[serde(default)]
    pub random_seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AiConfig {
    /// `gemini` or `cloudflare`
    pub backend: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_output_tokens: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloudflareConfig {
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConversationSettings {
    pub memory_window: usize,
    pub max_context_length: usize,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PersonaConfig {
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IpcConfig {
    pub enabled: bool,
    pub socket_path: PathBuf,
    pub max_frame_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Flat variables understood by the desktop app's `.env` files.
/// Earlier names win when several are set.
const LEGACY_ENV: &[(&str, &[&str])] = &[
    ("server.host", &["HOST"]),
    ("server.port", &["PORT"]),
    ("ai.backend", &["AI_BACKEND"]),
    ("gemini.api_key", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
    ("gemini.model", &["GEMINI_MODEL"]),
    ("gemini.max_output_tokens", &["GEMINI_MAX_TOKENS"]),
    ("cloudflare.auth", &["CF_AUTH", "CLOUDFLARE_AUTH"]),
    ("cloudflare.account_id", &["CF_ACCOUNT_ID", "CLOUDFLARE_ACCOUNT_ID"]),
    ("cloudflare.model", &["CF_MODEL"]),
    ("cloudflare.max_tokens", &["CF_MAX_TOKENS"]),
    ("conversation.memory_window", &["MEMORY_WINDOW"]),
    ("conversation.max_context_length", &["MAX_CONTEXT_LENGTH"]),
    ("persona.system_prompt_path", &["SYSTEM_PROMPT_PATH"]),
    ("ipc.socket_path", &["IPC_SOCKET"]),
    ("logging.format", &["LOG_FORMAT"]),
];

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = apply_legacy_env(builder, |key| std::env::var(key).ok())?.build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("ai.backend", "gemini")?
            .set_default("ai.timeout_seconds", 60)?
            .set_default("gemini.model", "gemini-2.0-flash")?
            .set_default("gemini.base_url", DEFAULT_GEMINI_BASE_URL)?
            .set_default("gemini.max_output_tokens", 2000)?
            .set_default("cloudflare.model", "llama-3.2-11b-vision-instruct")?
            .set_default("cloudflare.base_url", DEFAULT_CLOUDFLARE_BASE_URL)?
            .set_default("cloudflare.max_tokens", 512)?
            .set_default("conversation.memory_window", 5)?
            .set_default("conversation.max_context_length", 4000)?
            .set_default("conversation.sweep_interval_seconds", 60)?
            .set_default("ipc.enabled", true)?
            .set_default("ipc.socket_path", "/tmp/alcibiade.sock")?
            .set_default("ipc.max_frame_bytes", 8 * 1024 * 1024)?
            .set_default("retry.max_attempts", 3)?
            .set_default("retry.base_delay_ms", 1000)?
            .set_default("retry.max_jitter_ms", 250)?
            .set_default("logging.format", "json")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn backend(&self) -> BackendChoice {
        BackendChoice::from_setting(&self.ai.backend)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ai.timeout_seconds)
    }

    pub fn conversation_ttl(&self) -> Option<Duration> {
        self.conversation
            .ttl_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    #[cfg(test)]
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = apply_legacy_env(Self::defaults()?, lookup)?.build()?;
        Ok(config.try_deserialize()?)
    }
}

impl GeminiConfig {
    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }
}

impl CloudflareConfig {
    pub fn auth(&self) -> Option<&str> {
        non_blank(self.auth.as_deref())
    }

    pub fn account_id(&self) -> Option<&str> {
        non_blank(self.account_id.as_deref())
    }
}

/// Blank credentials count as unset
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Highest-priority layer: legacy flat variables override everything else.
pub fn apply_legacy_env<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for (key, names) in LEGACY_ENV {
        if let Some(value) = names.iter().find_map(|name| lookup(name)) {
            builder = builder.set_override(*key, value)?;
        }
    }
    Ok(builder)
}
