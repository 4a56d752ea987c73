//! Ingest: pull provider messages into the message store.
//!
//! Listing is paginated up to a fetch cap, messages are fetched in batches,
//! and each provider message is flattened into a [`StoredMessage`] before it
//! is inserted. Messages already stored are counted, not re-inserted.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::store::{MessageStore, StoredMessage};

/// Messages listed per run unless configured otherwise.
pub const DEFAULT_MAX_FETCH: usize = 5;
/// Provider cap on a single list page.
pub const DEFAULT_PAGE_SIZE: usize = 10;
/// Messages fetched concurrently per batch.
pub const DEFAULT_FETCH_BATCH: usize = 50;

/// Body parts arrive base64url-encoded, with or without padding.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

// ── Provider message shape ──────────────────────────────────────────

/// A message as returned by the provider's `messages.get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub id: String,
    #[serde(default)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub mime_type: String,
    #[serde(default)]
    pub body: PartBody,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl ProviderMessage {
    /// All values of header `name`, joined by `", "`.
    fn header_values(&self, name: &str) -> String {
        self.payload
            .headers
            .iter()
            .filter(|h| h.name == name)
            .map(|h| h.value.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn received_at(&self) -> Result<DateTime<Utc>, IngestError> {
        let raw = self
            .payload
            .headers
            .iter()
            .find(|h| h.name == "Date")
            .map(|h| h.value.as_str())
            .ok_or_else(|| IngestError::MissingHeader {
                message_id: self.id.clone(),
                header: "Date".into(),
            })?;

        DateTime::parse_from_rfc2822(strip_trailing_comment(raw))
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| IngestError::InvalidDate {
                message_id: self.id.clone(),
                value: raw.to_string(),
            })
    }

    /// Every `text/plain` part, decoded and whitespace-collapsed, joined by `", "`.
    fn plain_text_body(&self) -> Result<String, IngestError> {
        let mut texts = Vec::new();
        for part in self.payload.parts.iter().filter(|p| p.mime_type == "text/plain") {
            let data = part.body.data.as_deref().unwrap_or_default();
            let bytes = BODY_ENGINE
                .decode(data)
                .map_err(|e| IngestError::Decode {
                    message_id: self.id.clone(),
                    reason: e.to_string(),
                })?;
            // Invalid UTF-8 sequences are dropped.
            let text: String = bytes.utf8_chunks().map(|chunk| chunk.valid()).collect();
            texts.push(WHITESPACE_RUN.replace_all(&text, " ").into_owned());
        }
        Ok(texts.join(", "))
    }

    /// Flatten into the stored row shape; `to_address` is the mailbox owner.
    pub fn to_stored_message(&self, to_address: &str) -> Result<StoredMessage, IngestError> {
        Ok(StoredMessage {
            message_id: self.id.clone(),
            from_address: self.header_values("From"),
            to_address: to_address.to_string(),
            subject: self.header_values("Subject"),
            body: self.plain_text_body()?,
            received_at: self.received_at()?,
        })
    }
}

/// Drop a trailing RFC 2822 comment such as `(UTC)`.
fn strip_trailing_comment(value: &str) -> &str {
    let trimmed = value.trim_end();
    match trimmed.rfind('(') {
        Some(open) if trimmed.ends_with(')') => trimmed[..open].trim_end(),
        _ => trimmed,
    }
}

// ── Source ──────────────────────────────────────────────────────────

/// One page of a message listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Where messages come from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Address of the mailbox owner.
    async fn user_email(&self) -> Result<String, IngestError>;

    /// List up to `max_results` ids, spam and trash excluded.
    async fn list_page(
        &self,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessagePage, IngestError>;

    async fn get_message(&self, id: &str) -> Result<ProviderMessage, IngestError>;
}

/// Collect up to `max_fetch` message ids, following page tokens.
pub async fn list_message_ids(
    source: &dyn MessageSource,
    max_fetch: usize,
    page_size: usize,
) -> Result<Vec<String>, IngestError> {
    let page_limit = max_fetch.min(page_size).max(1);
    let mut ids = Vec::new();
    let mut token: Option<String> = None;

    while ids.len() < max_fetch {
        let page = source.list_page(token.as_deref(), page_limit).await?;
        debug!(listed = page.ids.len(), "Listed message page");
        let empty = page.ids.is_empty();
        ids.extend(page.ids);

        token = page.next_page_token;
        if token.is_none() || empty {
            break;
        }
    }

    ids.truncate(max_fetch);
    if ids.is_empty() {
        info!("No messages found");
    } else {
        info!(count = ids.len(), "Messages listed");
    }
    Ok(ids)
}

/// Fetch `ids` in concurrent batches. A message that fails to fetch is
/// logged and left out.
pub async fn fetch_messages(
    source: &dyn MessageSource,
    ids: &[String],
    batch_size: usize,
) -> Vec<ProviderMessage> {
    let mut messages = Vec::with_capacity(ids.len());
    for batch in ids.chunks(batch_size.max(1)) {
        let results = join_all(batch.iter().map(|id| source.get_message(id))).await;
        for (id, result) in batch.iter().zip(results) {
            match result {
                Ok(message) => messages.push(message),
                Err(e) => warn!(message_id = %id, error = %e, "Failed to fetch message, skipping"),
            }
        }
    }
    messages
}

// ── Ingest ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub max_fetch: usize,
    pub page_size: usize,
    pub fetch_batch: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_fetch: DEFAULT_MAX_FETCH,
            page_size: DEFAULT_PAGE_SIZE,
            fetch_batch: DEFAULT_FETCH_BATCH,
        }
    }
}

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub listed: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Fetched messages that could not be flattened.
    pub skipped: usize,
}

/// List, fetch and store messages from `source`.
///
/// Malformed messages are skipped with a warning; store failures abort.
pub async fn ingest(
    source: &dyn MessageSource,
    store: &dyn MessageStore,
    options: IngestOptions,
) -> Result<IngestReport, IngestError> {
    let user_email = source.user_email().await?;
    let ids = list_message_ids(source, options.max_fetch, options.page_size).await?;
    let messages = fetch_messages(source, &ids, options.fetch_batch).await;

    let mut report = IngestReport {
        listed: ids.len(),
        fetched: messages.len(),
        ..Default::default()
    };

    for message in &messages {
        let stored = match message.to_stored_message(&user_email) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Skipping malformed message");
                report.skipped += 1;
                continue;
            }
        };
        if store.insert_message(&stored).await? {
            report.inserted += 1;
        } else {
            report.duplicates += 1;
        }
    }

    info!(
        listed = report.listed,
        fetched = report.fetched,
        inserted = report.inserted,
        duplicates = report.duplicates,
        skipped = report.skipped,
        "Ingest complete"
    );
    Ok(report)
}

// ── Export file source ──────────────────────────────────────────────

/// A [`MessageSource`] over a saved export:
/// `{"user_email": "...", "messages": [<provider message>, ...]}`.
///
/// Page tokens are offsets into the message list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportSource {
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default)]
    messages: Vec<ProviderMessage>,
}

impl ExportSource {
    pub fn new(user_email: impl Into<String>, messages: Vec<ProviderMessage>) -> Self {
        Self {
            user_email: Some(user_email.into()),
            messages,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, IngestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        let raw = std::fs::read_to_string(path)?;
        let source = Self::from_json_str(&raw)?;
        info!(path = %path.display(), messages = source.messages.len(), "Export loaded");
        Ok(source)
    }

    /// Owner address to use when the export does not name one.
    pub fn with_fallback_user(mut self, user_email: &str) -> Self {
        if self.user_email.is_none() {
            self.user_email = Some(user_email.to_string());
        }
        self
    }
}

#[async_trait]
impl MessageSource for ExportSource {
    async fn user_email(&self) -> Result<String, IngestError> {
        self.user_email
            .clone()
            .ok_or_else(|| IngestError::Provider("export does not name its mailbox owner".into()))
    }

    async fn list_page(
        &self,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessagePage, IngestError> {
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| IngestError::Provider(format!("invalid page token: {token}")))?,
            None => 0,
        };
        let end = start.saturating_add(max_results).min(self.messages.len());
        let ids = self
            .messages
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let next_page_token = (end < self.messages.len()).then(|| end.to_string());
        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_message(&self, id: &str) -> Result<ProviderMessage, IngestError> {
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| IngestError::Provider(format!("message {id} not found")))
    }
}
