//! Rule schema and validation.
//!
//! A rule document is parsed once into an immutable [`Rule`]; parsing either
//! produces a fully valid rule or a [`SchemaError`](crate::error::SchemaError)
//! describing the first violation.

pub mod model;
pub mod parse;

pub use model::{
    Action, ActionKind, Actions, CollectionPredicate, Condition, DATE_FORMAT, DatePredicate, Field,
    Rule, TextField, TextPredicate, date_threshold,
};
pub use parse::parse;
