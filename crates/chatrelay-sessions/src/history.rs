use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::{Role, Turn};
use chatrelay_store::KeyValueStore;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::types::ConversationKey;

/// Per-(backend, user) turn history plus the stored system prompt.
///
/// History is bounded twice: by `max_turns` on write and by `ttl` in the store.
/// It is conversation memory, not an archive.
pub struct ConversationHistoryStore {
    store: Arc<KeyValueStore>,
    ttl: Duration,
    max_turns: usize,
}

impl ConversationHistoryStore {
    pub fn new(store: Arc<KeyValueStore>, ttl: Duration, max_turns: usize) -> Self {
        Self {
            store,
            ttl,
            max_turns,
        }
    }

    /// Load the stored conversation, oldest first.
    ///
    /// When `supports_prompt` is set and a prompt is stored, a `system` turn
    /// carrying it comes first. The caller appends the new user turn.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn load(&self, key: &ConversationKey, supports_prompt: bool) -> Vec<Turn> {
        let mut turns = Vec::new();

        if supports_prompt {
            if let Some(prompt) = self.get_prompt(key).await {
                turns.push(Turn::system(prompt));
            }
        }

        if let Some(raw) = self.store.get(&key.history_key()).await {
            match serde_json::from_str::<Vec<Turn>>(&raw) {
                Ok(stored) => turns.extend(stored),
                Err(e) => warn!(error = %e, "stored history is unreadable, starting fresh"),
            }
        }

        debug!(turns = turns.len(), "history loaded");
        turns
    }

    /// Replace the stored history with `turns`.
    ///
    /// `system` turns are dropped (the prompt lives under its own key and is
    /// re-injected by `load`) and only the newest `max_turns` are kept.
    #[instrument(skip(self, key, turns), fields(key = %key, turns = turns.len()))]
    pub async fn save(&self, key: &ConversationKey, turns: &[Turn]) -> Result<()> {
        let kept: Vec<&Turn> = turns.iter().filter(|t| t.role != Role::System).collect();
        let start = kept.len().saturating_sub(self.max_turns);
        let json = serde_json::to_string(&kept[start..])?;
        self.store.set(&key.history_key(), &json, self.ttl).await;
        debug!(stored = kept.len() - start, "history saved");
        Ok(())
    }

    /// Store `prompt` with the default TTL.
    pub async fn set_prompt(&self, key: &ConversationKey, prompt: &str) {
        self.store.set(&key.prompt_key(), prompt, Duration::ZERO).await;
    }

    pub async fn remove_prompt(&self, key: &ConversationKey) {
        self.store.delete(&key.prompt_key()).await;
    }

    /// `None` means no prompt is set; `Some("")` is a prompt that was set empty.
    pub async fn get_prompt(&self, key: &ConversationKey) -> Option<String> {
        self.store.get(&key.prompt_key()).await
    }
}
