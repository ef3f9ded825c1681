use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::services::conversation::{ContextBuilder, ConversationConfig, InMemoryConversationStore};
use crate::services::{AskService, FallbackEngine, RequestDispatcher};
use crate::utils::SharedRng;

/// Application state shared by the HTTP handlers and the IPC server
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub ask_service: Arc<AskService>,
    pub store: Arc<InMemoryConversationStore>,
}

impl AppState {
    pub fn new(settings: Settings, ask_service: Arc<AskService>, store: Arc<InMemoryConversationStore>) -> Self {
        Self {
            settings,
            ask_service,
            store,
        }
    }

    /// Wire the full pipeline from configuration. One random source feeds
    /// both the fallback picks and the retry jitter.
    pub fn from_settings(settings: Settings, system_prompt: String) -> Self {
        let rng = SharedRng::from_seed_option(settings.random_seed);

        let store = Arc::new(InMemoryConversationStore::new(
            ConversationConfig::with_memory_window(settings.conversation.memory_window),
            settings.conversation_ttl(),
        ));

        let ask_service = Arc::new(AskService::new(
            store.clone(),
            ContextBuilder::new(system_prompt, settings.conversation.max_context_length),
            RequestDispatcher::from_settings(&settings, rng.clone()),
            FallbackEngine::new(rng),
            settings.backend(),
        ));

        Self::new(settings, ask_service, store)
    }
}

impl FromRef<AppState> for Arc<AskService> {
    fn from_ref(state: &AppState) -> Self {
        state.ask_service.clone()
    }
}
