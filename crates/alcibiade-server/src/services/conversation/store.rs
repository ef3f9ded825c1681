use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::types::{Conversation, ConversationConfig};
use crate::models::chat::{ChatMessage, ConfigPatch, ConversationId};

/// Keyed conversation state, injected into the request pipeline.
///
/// Conversations are created lazily: every operation on an unseen id starts
/// from an empty history and the store's default config.
pub trait ConversationStore: Send + Sync {
    /// Snapshot of the conversation, created if missing
    fn get(&self, id: &str) -> Conversation;

    /// Append and evict the oldest entries beyond `2 x memory_window`
    fn append(&self, id: &str, message: ChatMessage);

    /// Merge `memoryWindow` / `useRAG`, returning the resulting config
    fn update_config(&self, id: &str, patch: &ConfigPatch) -> ConversationConfig;

    /// Config a new conversation starts from
    fn default_config(&self) -> ConversationConfig;
}

/// Thread-safe in-memory store backed by DashMap (per-key locking)
#[derive(Clone)]
pub struct InMemoryConversationStore {
    storage: Arc<DashMap<ConversationId, Conversation>>,
    defaults: ConversationConfig,
    /// Idle conversations older than this are discarded. `None` keeps them for the process lifetime.
    ttl: Option<Duration>,
}

impl InMemoryConversationStore {
    pub fn new(defaults: ConversationConfig, ttl: Option<Duration>) -> Self {
        info!(
            "Initializing conversation store (memory_window={}, ttl={:?})",
            defaults.memory_window, ttl
        );
        Self {
            storage: Arc::new(DashMap::new()),
            defaults,
            ttl,
        }
    }

    pub fn defaults(&self) -> ConversationConfig {
        self.defaults
    }

    fn entry(&self, id: &str) -> RefMut<'_, ConversationId, Conversation> {
        let mut entry = self
            .storage
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("Creating conversation {}", id);
                Conversation::new(id, self.defaults)
            });

        if let Some(ttl) = self.ttl {
            if entry.is_expired(ttl) {
                debug!("Conversation {} expired, starting fresh", id);
                *entry = Conversation::new(id, self.defaults);
            }
        }

        entry
    }

    pub fn remove(&self, id: &str) -> Option<Conversation> {
        self.storage.remove(id).map(|(_, conv)| conv)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop idle conversations. Returns number removed.
    pub fn cleanup_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let start_len = self.storage.len();
        self.storage.retain(|_, conv: &mut Conversation| !conv.is_expired(ttl));
        let count = start_len.saturating_sub(self.storage.len());

        if count > 0 {
            info!("Cleaned up {} expired conversations", count);
        }

        count
    }

    /// Periodic TTL sweep. No-op when no TTL is configured.
    pub fn start_sweeper(&self, every: Duration) -> Option<JoinHandle<()>> {
        self.ttl?;
        let store = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                store.cleanup_expired();
            }
        }))
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(ConversationConfig::default(), None)
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, id: &str) -> Conversation {
        self.entry(id).value().clone()
    }

    fn append(&self, id: &str, message: ChatMessage) {
        let mut entry = self.entry(id);
        entry.push(message);
        debug!(
            "Conversation {} now holds {} messages",
            id,
            entry.history.len()
        );
    }

    fn update_config(&self, id: &str, patch: &ConfigPatch) -> ConversationConfig {
        let mut entry = self.entry(id);
        entry.config.apply(patch);
        let evicted = entry.enforce_window();
        if evicted > 0 {
            debug!("Config change evicted {} messages from {}", evicted, id);
        }
        entry.touch();
        entry.config
    }

    fn default_config(&self) -> ConversationConfig {
        self.defaults
    }
}
