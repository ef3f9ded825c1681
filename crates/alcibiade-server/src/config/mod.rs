pub mod prompt;
pub mod settings;

pub use prompt::{load_system_prompt, DEFAULT_SYSTEM_PROMPT};
pub use settings::{
    AiConfig, CloudflareConfig, ConversationSettings, GeminiConfig, IpcConfig, LogFormat,
    LoggingConfig, PersonaConfig, RetryConfig, ServerConfig, Settings,
};
