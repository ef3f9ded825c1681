use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::BackendChoice;
use super::conversation::{ContextBuilder, Conversation, ConversationStore};
use super::dispatcher::RequestDispatcher;
use super::fallback::{FallbackEngine, PromptCategory};
use super::status::StatusSink;
use crate::models::chat::{ChatMessage, ConfigPatch, ConversationId, Selection};

/// One inbound ask, transport-independent
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub prompt: String,
    /// Editor document text
    pub document: String,
    pub selection: Option<Selection>,
    /// `None` runs the request against a fresh conversation that is not stored
    pub conversation_id: Option<ConversationId>,
    pub config: Option<ConfigPatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Remote(BackendChoice),
    Fallback(PromptCategory),
}

#[derive(Debug, Clone)]
pub struct AskAnswer {
    pub text: String,
    pub source: ResponseSource,
    pub conversation_id: ConversationId,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AskError {
    #[error("No prompt provided")]
    EmptyPrompt,
}

/// Orchestrates one ask: config merge, context build, dispatch, and the
/// fallback on any backend failure. Only validation errors reach the caller.
pub struct AskService {
    store: Arc<dyn ConversationStore>,
    context_builder: ContextBuilder,
    dispatcher: RequestDispatcher,
    fallback: FallbackEngine,
    backend: BackendChoice,
}

impl AskService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        context_builder: ContextBuilder,
        dispatcher: RequestDispatcher,
        fallback: FallbackEngine,
        backend: BackendChoice,
    ) -> Self {
        Self {
            store,
            context_builder,
            dispatcher,
            fallback,
            backend,
        }
    }

    pub fn backend(&self) -> BackendChoice {
        self.backend
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn remote_configured(&self) -> bool {
        self.dispatcher.is_configured(self.backend)
    }

    pub async fn ask(
        &self,
        request: AskRequest,
        status: &dyn StatusSink,
    ) -> Result<AskAnswer, AskError> {
        if request.prompt.trim().is_empty() {
            return Err(AskError::EmptyPrompt);
        }

        // Id-less asks run against a transient conversation that never enters the store
        let (conversation_id, conversation, persisted) = match request
            .conversation_id
            .filter(|id| !id.trim().is_empty())
        {
            Some(id) => {
                if let Some(patch) = &request.config {
                    let config = self.store.update_config(&id, patch);
                    debug!(
                        "Conversation {} config: memory_window={}, use_rag={}",
                        id, config.memory_window, config.use_rag
                    );
                }
                let conversation = self.store.get(&id);
                (id, conversation, true)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let mut conversation = Conversation::new(id.clone(), self.store.default_config());
                if let Some(patch) = &request.config {
                    conversation.config.apply(patch);
                }
                (id, conversation, false)
            }
        };

        let context = self.context_builder.build_context(
            &conversation,
            &request.document,
            request.selection.as_ref(),
        );
        let full_prompt = self.context_builder.build_prompt(&context, &request.prompt);

        match self.dispatcher.dispatch(&full_prompt, self.backend, status).await {
            Ok(generation) if !generation.text.is_empty() => {
                info!(
                    conversation_id = %conversation_id,
                    backend = %generation.backend,
                    attempts = generation.attempts,
                    "Remote response ready"
                );
                if persisted {
                    self.store
                        .append(&conversation_id, ChatMessage::user(request.prompt));
                    self.store
                        .append(&conversation_id, ChatMessage::assistant(generation.text.clone()));
                }
                Ok(AskAnswer {
                    text: generation.text,
                    source: ResponseSource::Remote(generation.backend),
                    conversation_id,
                })
            }
            Ok(generation) => {
                warn!(backend = %generation.backend, "Backend returned empty text, using fallback");
                Ok(self.fallback_answer(&request.prompt, conversation_id))
            }
            Err(err) => {
                warn!(error = %err, "Backend unavailable, using fallback");
                Ok(self.fallback_answer(&request.prompt, conversation_id))
            }
        }
    }

    fn fallback_answer(&self, prompt: &str, conversation_id: ConversationId) -> AskAnswer {
        let (category, text) = self.fallback.generate(prompt);
        AskAnswer {
            text,
            source: ResponseSource::Fallback(category),
            conversation_id,
        }
    }
}
