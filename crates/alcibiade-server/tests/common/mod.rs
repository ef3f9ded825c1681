#![allow(dead_code)]

use alcibiade_server::config::Settings;
use alcibiade_server::services::conversation::{
    ContextBuilder, ConversationConfig, InMemoryConversationStore,
};
use alcibiade_server::services::{
    AskService, BackendChoice, BackendError, FallbackEngine, GenerationBackend, RequestDispatcher,
    RetryPolicy,
};
use alcibiade_server::utils::SharedRng;
use alcibiade_server::AppState;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub fn test_settings() -> Settings {
    Settings::defaults()
        .unwrap()
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap()
}

/// Millisecond backoff so retry paths finish quickly on a real clock
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_jitter: Duration::from_millis(2),
    }
}

/// Backend that replays a fixed script and records every prompt it sees
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Value, BackendError>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<Value, BackendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str) -> Result<Value, BackendError> {
        self.prompts.lock().push(prompt.to_string());
        self.script.lock().pop_front().unwrap_or_else(|| {
            Err(BackendError::Http {
                status: 500,
                body: "script exhausted".to_string(),
            })
        })
    }
}

pub fn overloaded() -> BackendError {
    BackendError::Http {
        status: 503,
        body: "The model is overloaded.".to_string(),
    }
}

pub fn state_with(dispatcher: RequestDispatcher, memory_window: usize) -> AppState {
    let store = Arc::new(InMemoryConversationStore::new(
        ConversationConfig::with_memory_window(memory_window),
        None,
    ));
    let rng = SharedRng::seeded(7);
    let ask_service = Arc::new(AskService::new(
        store.clone(),
        ContextBuilder::new("Tu es Alcibiade.", 4000),
        dispatcher,
        FallbackEngine::new(rng),
        BackendChoice::Gemini,
    ));
    AppState::new(test_settings(), ask_service, store)
}

pub fn offline_state() -> AppState {
    state_with(RequestDispatcher::new(fast_retry(), SharedRng::seeded(7)), 5)
}

pub fn scripted_state(backend: Arc<ScriptedBackend>, memory_window: usize) -> AppState {
    let dispatcher =
        RequestDispatcher::new(fast_retry(), SharedRng::seeded(7)).with_gemini(backend);
    state_with(dispatcher, memory_window)
}
