//! Narrowing filter chains over stored messages.
//!
//! A [`MessageQuery`] starts unfiltered and each [`Filter`] added to it can
//! only shrink the result. Backends translate the chain into their own query
//! language; [`Filter::matches`] is the in-process reference semantics.

use chrono::{DateTime, Utc};

use super::traits::StoredMessage;
use crate::rules::{Condition, DatePredicate, TextField, TextPredicate, date_threshold};

/// A single constraint on stored messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Substring (non-)containment on a string field, ignoring ASCII case.
    Text {
        field: TextField,
        predicate: TextPredicate,
        needle: String,
    },
    /// Relational comparison of the received timestamp against `at`.
    Received {
        predicate: DatePredicate,
        at: DateTime<Utc>,
    },
}

impl Filter {
    /// Whether `message` passes this constraint.
    pub fn matches(&self, message: &StoredMessage) -> bool {
        match self {
            Self::Text {
                field,
                predicate,
                needle,
            } => predicate.test(message.text(*field), needle),
            Self::Received { predicate, at } => predicate.compare(&message.received_at, at),
        }
    }
}

impl From<&Condition> for Filter {
    fn from(condition: &Condition) -> Self {
        match condition {
            Condition::Text {
                field,
                predicate,
                value,
            } => Self::Text {
                field: *field,
                predicate: *predicate,
                needle: value.clone(),
            },
            Condition::ReceivedDate { predicate, date } => Self::Received {
                predicate: *predicate,
                at: date_threshold(*date),
            },
        }
    }
}

/// An AND-accumulated chain of filters. Empty means "every message".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    filters: Vec<Filter>,
}

impl MessageQuery {
    /// The unfiltered view of the store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint; the result can only shrink.
    pub fn narrow(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_unfiltered(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, message: &StoredMessage) -> bool {
        self.filters.iter().all(|f| f.matches(message))
    }
}
