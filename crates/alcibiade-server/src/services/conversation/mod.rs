//! Conversation memory
//!
//! Provides in-memory conversation state with:
//! - Thread-safe keyed storage (DashMap)
//! - Bounded sliding-window history (2 x memory_window)
//! - Prompt assembly from persona, transcript and document

mod context_builder;
mod store;
pub mod types;

pub use context_builder::{
    ContextBuilder, DEFAULT_MAX_CONTEXT_LENGTH, PERSONA_DIRECTIVE, SELECTION_CONTEXT_CHARS,
};
pub use store::{ConversationStore, InMemoryConversationStore};
pub use types::{Conversation, ConversationConfig, DEFAULT_MEMORY_WINDOW};

pub use crate::models::chat::{ChatMessage, ConversationId};
