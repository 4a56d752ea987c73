//! In-memory `MessageStore`: applies filter chains in process.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::query::MessageQuery;
use super::traits::{MessageStore, StoredMessage};
use crate::error::DatabaseError;

/// Message store held entirely in memory, in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<StoredMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `messages`; later duplicates are dropped.
    pub fn with_messages(messages: impl IntoIterator<Item = StoredMessage>) -> Self {
        let mut stored: Vec<StoredMessage> = Vec::new();
        for msg in messages {
            if !stored.iter().any(|m| m.message_id == msg.message_id) {
                stored.push(msg);
            }
        }
        Self {
            messages: RwLock::new(stored),
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<bool, DatabaseError> {
        let mut messages = self.messages.write().await;
        if messages.iter().any(|m| m.message_id == message.message_id) {
            debug!(message_id = %message.message_id, "Message already stored, skipping");
            return Ok(false);
        }
        messages.push(message.clone());
        Ok(true)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.message_id == message_id).cloned())
    }

    async fn count_messages(&self) -> Result<usize, DatabaseError> {
        Ok(self.messages.read().await.len())
    }

    async fn query_ids(&self, query: &MessageQuery) -> Result<Vec<String>, DatabaseError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| query.matches(m))
            .map(|m| m.message_id.clone())
            .collect())
    }
}
