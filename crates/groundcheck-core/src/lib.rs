//! # groundcheck-core
//!
//! Deterministic answer-grounding guardrail and intent classifier for
//! knowledge-graph question answering.
//!
//! Generation models in a KGQA pipeline are instructed to follow a two-line
//! `ANSWER:` / `EVIDENCE:` contract. This crate decides, without calling any
//! model itself, whether such a response can be trusted:
//!
//! - [`contract`] parses raw model text into a normalized answer plus
//!   validated evidence citations, flagging every malformation.
//! - [`support`] scores how well the answer is grounded in the evidence it
//!   cites.
//! - [`enforcement`] applies a policy to violating answers: accept, force
//!   the `UNKNOWN` sentinel, or retry exactly once.
//! - [`intent`] classifies the question against weighted rules and flags
//!   multi-intent or ambiguous questions.
//! - [`audit`] fingerprints the effective configuration so two runs can be
//!   proven identical.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same input always produces same output
//! 2. **No LLM calls**: the caller supplies model text and a regeneration
//!    hook; the engine never generates
//! 3. **Auditable**: every decision carries the scores and rule hits that
//!    produced it, and the configuration is SHA-256 fingerprinted
//! 4. **Malformed input never panics**: contract violations degrade to flags
//!
//! ## Example
//!
//! ```rust,ignore
//! use groundcheck_core::{verify_response, Policy, Triple};
//!
//! let retrieved = vec![Triple::new("I/G bit", "means", "Individual/Group")];
//! let report = verify_response(
//!     "ANSWER: Individual/Group\nEVIDENCE: 1",
//!     &retrieved,
//!     Policy::RetryOnce,
//!     5,
//!     || Err(groundcheck_core::RegenerateError("no backend".into())),
//! );
//! assert_eq!(report.decision.final_answer, "Individual/Group");
//! ```

pub mod audit;
pub mod config;
pub mod contract;
pub mod enforcement;
pub mod intent;
pub mod normalize;
pub mod support;

// Re-export main types at crate root
pub use audit::AuditInfo;
pub use config::{
    ConfigError, ConflictPair, EngineConfig, ModelFusion, RuleEntry, RulesConfig, Taxonomy,
    TaxonomyEntry, Thresholds,
};
pub use contract::ParsedContract;
pub use enforcement::{
    Action, EnforcementDecision, Policy, RegenerateError, UnknownPolicy, UNKNOWN_ANSWER,
};
pub use intent::{
    Intent, IntentEngine, IntentPrediction, NullModel, RuleSet, ScoreProvider, TriggeredRule,
    UNKNOWN_LABEL,
};
pub use support::{
    EvidenceSupportResult, SupportSample, SupportSummary, Triple, DEFAULT_KEY_TOKENS_K,
    SUPPORT_THRESHOLD,
};

use serde::{Deserialize, Serialize};

/// Everything the guardrail concluded about one model response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardrailReport {
    pub parsed: ParsedContract,
    pub support: EvidenceSupportResult,
    pub decision: EnforcementDecision,
}

/// Run the full guardrail over one raw model response: parse the contract,
/// score evidence support, then enforce `policy`.
///
/// This is the main entry point for callers that do not need the
/// intermediate records individually. `regenerate` is consumed at most once,
/// per the enforcement state machine.
pub fn verify_response<F>(
    raw_text: &str,
    retrieved: &[Triple],
    policy: Policy,
    key_tokens_k: usize,
    regenerate: F,
) -> GuardrailReport
where
    F: FnOnce() -> Result<String, RegenerateError>,
{
    let parsed = contract::parse(raw_text, retrieved.len());
    let support = support::compute_support(
        &parsed.raw_answer,
        &parsed.evidence_line_ids,
        retrieved,
        key_tokens_k,
    );
    let decision = enforcement::enforce(
        &parsed,
        &support,
        policy,
        retrieved,
        key_tokens_k,
        regenerate,
    );
    GuardrailReport {
        parsed,
        support,
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grounded_response_passes_end_to_end() {
        let retrieved = vec![Triple::new("I/G bit", "means", "Individual/Group")];
        let report = verify_response(
            "ANSWER: Individual/Group\nEVIDENCE: 1",
            &retrieved,
            Policy::RetryOnce,
            DEFAULT_KEY_TOKENS_K,
            || panic!("regenerate must not be called"),
        );
        assert_eq!(report.support.coverage, Some(1.0));
        assert_eq!(report.decision.action, Action::None);
        assert_eq!(report.decision.final_answer, "Individual/Group");
    }

    #[test]
    fn test_ungrounded_response_forced_unknown_end_to_end() {
        let retrieved = vec![Triple::new("France", "capital", "Tokyo")];
        let report = verify_response(
            "ANSWER: Paris\nEVIDENCE: 1",
            &retrieved,
            Policy::ForceUnknown,
            DEFAULT_KEY_TOKENS_K,
            || panic!("regenerate must not be called"),
        );
        assert_eq!(report.support.coverage, Some(0.0));
        assert_eq!(report.decision.action, Action::ForceUnknown);
        assert_eq!(report.decision.final_answer, UNKNOWN_ANSWER);
    }

    #[test]
    fn test_retry_resolves_end_to_end() {
        let retrieved = vec![Triple::new("France", "capital", "Tokyo")];
        let report = verify_response(
            "ANSWER: Paris\nEVIDENCE: 1",
            &retrieved,
            Policy::RetryOnce,
            DEFAULT_KEY_TOKENS_K,
            || Ok("ANSWER: Tokyo\nEVIDENCE: 1".to_string()),
        );
        assert_eq!(report.decision.action, Action::RetryResolved);
        assert_eq!(report.decision.final_answer, "Tokyo");
    }

    #[test]
    fn test_report_serializes_to_plain_json() {
        let retrieved = vec![Triple::new("France", "capital", "Tokyo")];
        let report = verify_response(
            "ANSWER: Paris\nEVIDENCE: 1",
            &retrieved,
            Policy::ForceUnknown,
            DEFAULT_KEY_TOKENS_K,
            || panic!("regenerate must not be called"),
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["decision"]["action"], "force_unknown");
        assert_eq!(value["parsed"]["evidence_line_ids"][0], 1);
        assert_eq!(value["support"]["coverage"], 0.0);
    }
}
