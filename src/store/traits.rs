//! `MessageStore` trait: the single async interface over persisted messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::query::MessageQuery;
use crate::error::DatabaseError;
use crate::rules::TextField;

/// A persisted email message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Provider-assigned identifier, unique within the store.
    pub message_id: String,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Value of a string field.
    pub fn text(&self, field: TextField) -> &str {
        match field {
            TextField::FromAddress => &self.from_address,
            TextField::ToAddress => &self.to_address,
            TextField::Subject => &self.subject,
            TextField::Body => &self.body,
        }
    }
}

/// Backend-agnostic message storage.
///
/// Rule evaluation only ever calls [`MessageStore::query_ids`]; the write
/// methods exist for ingest.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create or upgrade the schema.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert a message. Returns `false` if `message_id` was already stored.
    async fn insert_message(&self, message: &StoredMessage) -> Result<bool, DatabaseError>;

    /// Look up a message by its provider identifier.
    async fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>, DatabaseError>;

    /// Number of stored messages.
    async fn count_messages(&self) -> Result<usize, DatabaseError>;

    /// Identifiers of every message passing all filters in `query`,
    /// in insertion order.
    async fn query_ids(&self, query: &MessageQuery) -> Result<Vec<String>, DatabaseError>;
}
