//! Predicate evaluator: turns a rule plus a message store into the
//! identifiers of matching messages.
//!
//! - `All`: every condition narrows one accumulated query; the store is hit
//!   once with the whole chain. Zero conditions select every message.
//! - `Any`: each condition is queried on its own against the unfiltered
//!   store (concurrently) and the results are unioned in order of first
//!   discovery, without duplicates. Zero conditions select nothing.
//!
//! Date conditions are compared as parsed dates in both modes.

use std::collections::HashSet;

use futures::future::try_join_all;
use tracing::debug;

use crate::error::EvaluationError;
use crate::rules::{CollectionPredicate, Condition, Rule};
use crate::store::{Filter, MessageQuery, MessageStore};

/// Evaluate `rule` against `store`.
///
/// A store failure aborts the whole evaluation; no partial result is returned.
pub async fn evaluate(
    store: &dyn MessageStore,
    rule: &Rule,
) -> Result<Vec<String>, EvaluationError> {
    let ids = match rule.collection_predicate() {
        CollectionPredicate::All => evaluate_all(store, rule.conditions()).await?,
        CollectionPredicate::Any => evaluate_any(store, rule.conditions()).await?,
    };
    debug!(
        collection_predicate = rule.collection_predicate().as_str(),
        conditions = rule.conditions().len(),
        matched = ids.len(),
        "Rule evaluated"
    );
    Ok(ids)
}

async fn evaluate_all(
    store: &dyn MessageStore,
    conditions: &[Condition],
) -> Result<Vec<String>, EvaluationError> {
    let mut query = MessageQuery::new();
    for (index, condition) in conditions.iter().enumerate() {
        debug!(
            index,
            field = condition.field().as_str(),
            predicate = condition.predicate_str(),
            "Narrowing by condition"
        );
        query = query.narrow(Filter::from(condition));
    }

    store
        .query_ids(&query)
        .await
        .map_err(|source| EvaluationError::StoreAccess {
            stage: format!("match-all query over {} condition(s)", conditions.len()),
            source,
        })
}

async fn evaluate_any(
    store: &dyn MessageStore,
    conditions: &[Condition],
) -> Result<Vec<String>, EvaluationError> {
    let per_condition = try_join_all(conditions.iter().enumerate().map(
        |(index, condition)| async move {
            let query = MessageQuery::new().narrow(Filter::from(condition));
            let ids = store
                .query_ids(&query)
                .await
                .map_err(|source| EvaluationError::StoreAccess {
                    stage: format!("condition #{index}"),
                    source,
                })?;
            debug!(
                index,
                field = condition.field().as_str(),
                matched = ids.len(),
                "Condition evaluated"
            );
            Ok::<_, EvaluationError>(ids)
        },
    ))
    .await?;

    let mut seen = HashSet::new();
    Ok(per_condition
        .into_iter()
        .flatten()
        .filter(|id| seen.insert(id.clone()))
        .collect())
}
