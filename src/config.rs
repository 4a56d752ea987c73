//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::ingest::{DEFAULT_FETCH_BATCH, DEFAULT_MAX_FETCH, DEFAULT_PAGE_SIZE, IngestOptions};
use crate::pipeline::actions::DEFAULT_MODIFY_BATCH;

/// Provider user id meaning "the authenticated mailbox".
pub const DEFAULT_USER_ID: &str = "me";

/// Triage run configuration, built from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Rule document to evaluate.
    pub rules_path: PathBuf,
    /// Provider message export to ingest before evaluating.
    pub import_path: Option<PathBuf>,
    /// Provider label list; enables action planning.
    pub labels_path: Option<PathBuf>,
    /// Stored as `to_address` when the export does not name its owner.
    pub user_email: String,
    pub max_fetch: usize,
    pub page_size: usize,
    pub fetch_batch: usize,
    pub modify_batch: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/email.db"),
            rules_path: PathBuf::from("rules.json"),
            import_path: None,
            labels_path: None,
            user_email: DEFAULT_USER_ID.to_string(),
            max_fetch: DEFAULT_MAX_FETCH,
            page_size: DEFAULT_PAGE_SIZE,
            fetch_batch: DEFAULT_FETCH_BATCH,
            modify_batch: DEFAULT_MODIFY_BATCH,
        }
    }
}

impl TriageConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let path = |key: &str| lookup(key).filter(|s| !s.is_empty()).map(PathBuf::from);

        Ok(Self {
            db_path: path("TRIAGE_DB_PATH").unwrap_or(defaults.db_path),
            rules_path: path("TRIAGE_RULES_PATH").unwrap_or(defaults.rules_path),
            import_path: path("TRIAGE_IMPORT_PATH"),
            labels_path: path("TRIAGE_LABELS_PATH"),
            user_email: lookup("TRIAGE_USER_EMAIL")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.user_email),
            max_fetch: positive(&lookup, "TRIAGE_MAX_FETCH", defaults.max_fetch)?,
            page_size: positive(&lookup, "TRIAGE_PAGE_SIZE", defaults.page_size)?,
            fetch_batch: positive(&lookup, "TRIAGE_FETCH_BATCH", defaults.fetch_batch)?,
            modify_batch: positive(&lookup, "TRIAGE_MODIFY_BATCH", defaults.modify_batch)?,
        })
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            max_fetch: self.max_fetch,
            page_size: self.page_size,
            fetch_batch: self.fetch_batch,
        }
    }
}

/// Parse an optional variable; unset means `default`, zero is rejected.
fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
