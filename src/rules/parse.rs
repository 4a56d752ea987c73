//! Rule document validation.
//!
//! Checks run in a fixed order (top-level keys, collection predicate, each
//! condition in sequence, each action in key order) and the first violation
//! is returned, so the same document always produces the same error.

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::model::{
    Action, ActionKind, Actions, CollectionPredicate, Condition, DATE_FORMAT, DatePredicate, Field,
    Rule, TextPredicate, join_allowed,
};
use crate::error::SchemaError;

const KEY_COLLECTION_PREDICATE: &str = "collection_predicate";
const KEY_CONDITIONS: &str = "conditions";
const KEY_ACTIONS: &str = "actions";
const RULE_KEYS: [&str; 3] = [KEY_COLLECTION_PREDICATE, KEY_CONDITIONS, KEY_ACTIONS];

const KEY_FIELD: &str = "field";
const KEY_PREDICATE: &str = "predicate";
const KEY_VALUE: &str = "value";
const CONDITION_KEYS: [&str; 3] = [KEY_FIELD, KEY_PREDICATE, KEY_VALUE];

/// `DD-MM-YYYY` shape; chrono alone accepts short years, signs and spaces.
static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,2}-[0-9]{1,2}-[0-9]{4}$").expect("valid date pattern"));

/// Validate a raw rule document.
pub fn parse(raw: &Value) -> Result<Rule, SchemaError> {
    let doc = raw.as_object().ok_or_else(|| SchemaError::InvalidType {
        key: "rule".into(),
        expected: "an object".into(),
    })?;

    if !RULE_KEYS.iter().all(|k| doc.contains_key(*k)) {
        return Err(SchemaError::MissingKeys {
            expected: join_allowed(RULE_KEYS),
        });
    }

    let collection_predicate = parse_collection_predicate(&doc[KEY_COLLECTION_PREDICATE])?;

    let raw_conditions = doc[KEY_CONDITIONS]
        .as_array()
        .ok_or_else(|| SchemaError::InvalidType {
            key: KEY_CONDITIONS.into(),
            expected: "an array".into(),
        })?;
    let conditions = raw_conditions
        .iter()
        .enumerate()
        .map(|(index, c)| parse_condition(index, c))
        .collect::<Result<Vec<_>, _>>()?;

    let raw_actions = doc[KEY_ACTIONS]
        .as_object()
        .ok_or_else(|| SchemaError::InvalidType {
            key: KEY_ACTIONS.into(),
            expected: "an object".into(),
        })?;
    let actions = parse_actions(raw_actions)?;

    Ok(Rule::new(collection_predicate, conditions, actions))
}

fn parse_collection_predicate(raw: &Value) -> Result<CollectionPredicate, SchemaError> {
    raw.as_str()
        .and_then(CollectionPredicate::parse)
        .ok_or_else(|| SchemaError::InvalidCollectionPredicate {
            found: display_value(raw),
            allowed: join_allowed(CollectionPredicate::VARIANTS.iter().map(|p| p.as_str())),
        })
}

fn parse_condition(index: usize, raw: &Value) -> Result<Condition, SchemaError> {
    let cond = raw.as_object().ok_or_else(|| SchemaError::InvalidType {
        key: format!("{KEY_CONDITIONS}[{index}]"),
        expected: "an object".into(),
    })?;

    if !CONDITION_KEYS.iter().all(|k| cond.contains_key(*k)) {
        return Err(SchemaError::MissingConditionKeys {
            index,
            expected: join_allowed(CONDITION_KEYS),
        });
    }

    let raw_field = &cond[KEY_FIELD];
    let field = raw_field
        .as_str()
        .and_then(Field::parse)
        .ok_or_else(|| SchemaError::InvalidField {
            index,
            found: display_value(raw_field),
            allowed: join_allowed(Field::VARIANTS.iter().map(|f| f.as_str())),
        })?;

    let raw_predicate = &cond[KEY_PREDICATE];
    let value = cond[KEY_VALUE]
        .as_str()
        .ok_or_else(|| SchemaError::InvalidType {
            key: format!("{KEY_CONDITIONS}[{index}].{KEY_VALUE}"),
            expected: "a string".into(),
        });

    match field.as_text() {
        None => {
            let predicate = raw_predicate
                .as_str()
                .and_then(DatePredicate::parse)
                .ok_or_else(|| SchemaError::InvalidPredicate {
                    index,
                    field: field.as_str().into(),
                    found: display_value(raw_predicate),
                    allowed: join_allowed(DatePredicate::VARIANTS.iter().map(|p| p.as_str())),
                })?;
            let value = value?;
            let date = DATE_SHAPE
                .is_match(value)
                .then(|| NaiveDate::parse_from_str(value, DATE_FORMAT).ok())
                .flatten()
                .ok_or_else(|| SchemaError::InvalidDate {
                    index,
                    value: value.into(),
                    format: DATE_FORMAT.into(),
                })?;
            Ok(Condition::ReceivedDate { predicate, date })
        }
        Some(text_field) => {
            let predicate = raw_predicate
                .as_str()
                .and_then(TextPredicate::parse)
                .ok_or_else(|| SchemaError::InvalidPredicate {
                    index,
                    field: field.as_str().into(),
                    found: display_value(raw_predicate),
                    allowed: join_allowed(TextPredicate::VARIANTS.iter().map(|p| p.as_str())),
                })?;
            Ok(Condition::Text {
                field: text_field,
                predicate,
                value: value?.to_string(),
            })
        }
    }
}

fn parse_actions(raw: &Map<String, Value>) -> Result<Actions, SchemaError> {
    let mut actions = Actions::default();
    for (key, value) in raw {
        let kind = ActionKind::parse(key).ok_or_else(|| SchemaError::InvalidAction {
            found: key.clone(),
            allowed: join_allowed(ActionKind::VARIANTS.iter().map(|a| a.as_str())),
        })?;
        let action = match kind {
            ActionKind::MoveToFolder => value
                .as_str()
                .map(|folder| Action::MoveToFolder(folder.to_string())),
            ActionKind::MarkAsRead => value.as_bool().map(Action::MarkAsRead),
        }
        .ok_or_else(|| SchemaError::InvalidActionValue {
            action: key.clone(),
            expected: match kind {
                ActionKind::MoveToFolder => "a folder name string".into(),
                ActionKind::MarkAsRead => "a boolean".into(),
            },
        })?;
        actions.set(action);
    }
    Ok(actions)
}

/// Strings are shown bare, anything else as JSON.
fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Rule {
    /// Validate a raw rule document.
    pub fn parse(raw: &Value) -> Result<Self, SchemaError> {
        parse(raw)
    }

    /// Parse and validate a JSON rule document.
    pub fn from_json_str(s: &str) -> Result<Self, SchemaError> {
        let raw: Value = serde_json::from_str(s)?;
        parse(&raw)
    }

    /// Load and validate a rule document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let rule = Self::from_json_str(&contents)?;
        info!(
            path = %path.display(),
            collection_predicate = rule.collection_predicate().as_str(),
            conditions = rule.conditions().len(),
            "Rule loaded"
        );
        Ok(rule)
    }

    /// Canonical document form. `Rule::parse(&rule.to_value())` yields `rule`.
    pub fn to_value(&self) -> Value {
        let conditions: Vec<Value> = self
            .conditions()
            .iter()
            .map(|c| {
                json!({
                    KEY_FIELD: c.field().as_str(),
                    KEY_PREDICATE: c.predicate_str(),
                    KEY_VALUE: c.value_string(),
                })
            })
            .collect();

        let mut actions = Map::new();
        for action in self.actions().iter() {
            let value = match &action {
                Action::MoveToFolder(folder) => Value::String(folder.clone()),
                Action::MarkAsRead(read) => Value::Bool(*read),
            };
            actions.insert(action.kind().as_str().to_string(), value);
        }

        debug!(conditions = conditions.len(), "Rendering canonical rule");
        json!({
            KEY_COLLECTION_PREDICATE: self.collection_predicate().as_str(),
            KEY_CONDITIONS: conditions,
            KEY_ACTIONS: actions,
        })
    }
}
