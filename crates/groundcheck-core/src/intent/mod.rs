//! Rule-based multi-label intent classification.
//!
//! A question is scored against an immutable set of weighted rules,
//! optionally fused with a trained classifier's scores, then ranked and
//! checked for multi-intent and ambiguity. Everything is deterministic and
//! reproducible: identical question + identical config = identical
//! prediction.

mod engine;
mod rules;

pub use engine::{
    Intent, IntentEngine, IntentPrediction, NullModel, ScoreProvider, TriggeredRule,
    UNKNOWN_LABEL,
};
pub use rules::{Matcher, Rule, RuleSet};
