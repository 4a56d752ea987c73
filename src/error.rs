//! Error types for email triage.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// A rule document that does not describe a valid rule.
///
/// Every variant that rejects an enumerated value carries the allowed set,
/// already joined for display.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Some fields are missing in the rule, expected fields are {expected}")]
    MissingKeys { expected: String },

    #[error("Invalid type for '{key}', expected {expected}")]
    InvalidType { key: String, expected: String },

    #[error("Collection predicate '{found}' must be one of {allowed}")]
    InvalidCollectionPredicate { found: String, allowed: String },

    #[error("Fields missing in condition #{index}. Expected fields are {expected}")]
    MissingConditionKeys { index: usize, expected: String },

    #[error("Invalid field '{found}' in condition #{index}. Allowed fields are {allowed}")]
    InvalidField {
        index: usize,
        found: String,
        allowed: String,
    },

    #[error(
        "Invalid predicate '{found}' for the {field} field in condition #{index}. Allowed predicates are {allowed}"
    )]
    InvalidPredicate {
        index: usize,
        field: String,
        found: String,
        allowed: String,
    },

    #[error("Invalid date '{value}' in condition #{index}. Accepted format is '{format}'")]
    InvalidDate {
        index: usize,
        value: String,
        format: String,
    },

    #[error("Invalid action '{found}'. Allowed actions are {allowed}")]
    InvalidAction { found: String, allowed: String },

    #[error("Invalid value for action '{action}', expected {expected}")]
    InvalidActionValue { action: String, expected: String },

    #[error("Malformed rule document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read rule file: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures while evaluating a rule against a message store.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Store access failed during {stage}: {source}")]
    StoreAccess {
        stage: String,
        #[source]
        source: DatabaseError,
    },
}

/// Failures while translating or applying rule actions.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Label '{folder}' not found")]
    LabelNotFound { folder: String },

    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Malformed label list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while pulling messages from the provider into the store.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Message {message_id} has no {header} header")]
    MissingHeader { message_id: String, header: String },

    #[error("Message {message_id} has an unparsable date: {value}")]
    InvalidDate { message_id: String, value: String },

    #[error("Message {message_id} body could not be decoded: {reason}")]
    Decode { message_id: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Malformed export: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_names_allowed_set() {
        let err = SchemaError::InvalidCollectionPredicate {
            found: "Every".into(),
            allowed: "All, Any".into(),
        };
        assert_eq!(
            err.to_string(),
            "Collection predicate 'Every' must be one of All, Any"
        );
    }

    #[test]
    fn store_access_keeps_database_error_as_source() {
        use std::error::Error as _;

        let err = EvaluationError::StoreAccess {
            stage: "condition #0".into(),
            source: DatabaseError::Query("disk I/O error".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("condition #0"));
        assert!(msg.contains("disk I/O error"));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Query failed: disk I/O error"));
    }
}
