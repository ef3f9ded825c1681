use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::models::chat::{ChatMessage, ConfigPatch, ConversationId};

pub const DEFAULT_MEMORY_WINDOW: usize = 5;

/// Per-conversation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    /// Number of message pairs kept for context (>= 1)
    pub memory_window: usize,

    /// Accepted from clients, not used by the pipeline
    #[serde(rename = "useRAG")]
    pub use_rag: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            memory_window: DEFAULT_MEMORY_WINDOW,
            use_rag: true,
        }
    }
}

impl ConversationConfig {
    pub fn with_memory_window(memory_window: usize) -> Self {
        Self {
            memory_window: memory_window.max(1),
            ..Self::default()
        }
    }

    /// Shallow merge of the recognized keys
    pub fn apply(&mut self, patch: &ConfigPatch) {
        if let Some(window) = patch.memory_window {
            self.memory_window = window.max(1) as usize;
        }
        if let Some(use_rag) = patch.use_rag {
            self.use_rag = use_rag;
        }
    }

    /// Retained history bound (2 x memory_window)
    pub fn history_limit(&self) -> usize {
        self.memory_window * 2
    }
}

/// Complete conversation state held by the store
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,

    /// Oldest first
    pub history: Vec<ChatMessage>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: ConversationConfig,
}

impl Conversation {
    pub fn new(id: impl Into<ConversationId>, config: ConversationConfig) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            history: Vec::with_capacity(config.history_limit()),
            created_at: now,
            updated_at: now,
            config,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
        self.enforce_window();
        self.touch();
    }

    /// Drop the oldest messages until the history fits the bound.
    /// Returns how many were evicted.
    pub fn enforce_window(&mut self) -> usize {
        let limit = self.config.history_limit();
        if self.history.len() <= limit {
            return 0;
        }
        let excess = self.history.len() - limit;
        self.history.drain(..excess);
        excess
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// The trailing `memory_window` messages surfaced to the model
    pub fn recent_messages(&self) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(self.config.memory_window);
        &self.history[start..]
    }

    /// Idle for longer than `ttl`
    pub fn is_expired(&self, ttl: Duration) -> bool {
        match (Utc::now() - self.updated_at).to_std() {
            Ok(idle) => idle > ttl,
            Err(_) => false, // updated_at in the future
        }
    }
}
