//! Rule processing pipeline.
//!
//! 1. `evaluator::evaluate()`: select the messages a rule matches
//! 2. `actions::LabelChanges`: turn the rule's actions into label changes
//! 3. `actions::apply()`: send batch-modify requests for the matched ids

pub mod actions;
pub mod evaluator;

pub use actions::{BatchModifyRequest, LabelChanges, LabelMap, LabelResolver, Modifier};
pub use evaluator::evaluate;
