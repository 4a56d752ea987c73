//! Rule actions: translate a rule's action mapping into provider label
//! changes and batch-modify requests.
//!
//! `move_to_folder` resolves the folder name to a label id and adds it;
//! `mark_as_read` removes (`true`) or adds (`false`) the `UNREAD` label.
//! Matching message ids are sent in chunks, one request per chunk.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::ActionError;
use crate::rules::{Action, Rule};

/// System label carried by unread messages.
pub const UNREAD_LABEL: &str = "UNREAD";

/// Upper bound on ids per batch-modify request.
pub const DEFAULT_MODIFY_BATCH: usize = 1000;

/// Resolves a folder name to the provider's label id.
#[async_trait]
pub trait LabelResolver: Send + Sync {
    /// `Ok(None)` when no label has that name.
    async fn label_id(&self, name: &str) -> Result<Option<String>, ActionError>;
}

/// A provider label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Label list loaded from the provider's `{"labels": [...]}` document.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    by_name: HashMap<String, String>,
}

#[derive(Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

impl LabelMap {
    /// Build from labels; when names repeat the first label wins.
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Self {
        let mut by_name = HashMap::new();
        for label in labels {
            by_name.entry(label.name).or_insert(label.id);
        }
        Self { by_name }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ActionError> {
        let list: LabelList = serde_json::from_str(json)?;
        Ok(Self::new(list.labels))
    }

    pub fn from_file(path: &Path) -> Result<Self, ActionError> {
        let raw = std::fs::read_to_string(path)?;
        let map = Self::from_json_str(&raw)?;
        info!(path = %path.display(), labels = map.len(), "Label list loaded");
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[async_trait]
impl LabelResolver for LabelMap {
    async fn label_id(&self, name: &str) -> Result<Option<String>, ActionError> {
        Ok(self.by_name.get(name).cloned())
    }
}

/// Body of a provider batch-modify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchModifyRequest {
    pub ids: Vec<String>,
    pub add_label_ids: Vec<String>,
    pub remove_label_ids: Vec<String>,
}

/// Label additions and removals implied by a rule's actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChanges {
    pub add_label_ids: Vec<String>,
    pub remove_label_ids: Vec<String>,
}

impl LabelChanges {
    /// Resolve every action of `rule`. An unknown folder fails the whole rule.
    pub async fn from_rule(
        rule: &Rule,
        resolver: &dyn LabelResolver,
    ) -> Result<Self, ActionError> {
        let mut changes = Self::default();
        for action in rule.actions().iter() {
            match action {
                Action::MoveToFolder(folder) => {
                    let label_id = resolver.label_id(&folder).await?;
                    match label_id {
                        Some(id) => changes.add_label_ids.push(id),
                        None => return Err(ActionError::LabelNotFound { folder }),
                    }
                }
                Action::MarkAsRead(true) => changes.remove_label_ids.push(UNREAD_LABEL.into()),
                Action::MarkAsRead(false) => changes.add_label_ids.push(UNREAD_LABEL.into()),
            }
        }
        info!(
            add = ?changes.add_label_ids,
            remove = ?changes.remove_label_ids,
            "Rule actions resolved"
        );
        Ok(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.add_label_ids.is_empty() && self.remove_label_ids.is_empty()
    }

    /// Split `ids` into requests of at most `batch_size` ids each, in order.
    pub fn batches(&self, ids: &[String], batch_size: usize) -> Vec<BatchModifyRequest> {
        ids.chunks(batch_size.max(1))
            .map(|chunk| BatchModifyRequest {
                ids: chunk.to_vec(),
                add_label_ids: self.add_label_ids.clone(),
                remove_label_ids: self.remove_label_ids.clone(),
            })
            .collect()
    }
}

/// Sink for batch-modify requests (the provider, or a stand-in for it).
#[async_trait]
pub trait Modifier: Send + Sync {
    async fn batch_modify(&self, request: &BatchModifyRequest) -> Result<(), ActionError>;
}

/// Send `batches` in order, stopping at the first failure.
///
/// Returns the number of message ids covered by the requests that succeeded.
pub async fn apply(
    modifier: &dyn Modifier,
    batches: &[BatchModifyRequest],
) -> Result<usize, ActionError> {
    let mut modified = 0;
    for (index, batch) in batches.iter().enumerate() {
        if let Err(e) = modifier.batch_modify(batch).await {
            error!(batch = index, ids = batch.ids.len(), error = %e, "Batch modify failed");
            return Err(e);
        }
        debug!(batch = index, ids = batch.ids.len(), "Batch modified");
        modified += batch.ids.len();
    }
    info!(batches = batches.len(), modified, "Rule actions applied");
    Ok(modified)
}

/// Writes each request as one line of JSON instead of calling the provider.
pub struct JsonLineModifier<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLineModifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> Modifier for JsonLineModifier<W> {
    async fn batch_modify(&self, request: &BatchModifyRequest) -> Result<(), ActionError> {
        let line = serde_json::to_string(request)?;
        let mut out = self
            .out
            .lock()
            .map_err(|e| ActionError::Provider(format!("output lock poisoned: {e}")))?;
        writeln!(out, "{line}")?;
        Ok(())
    }
}
