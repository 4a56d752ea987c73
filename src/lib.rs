//! Email triage: rule schema, predicate evaluation and message storage.

pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod rules;
pub mod store;
