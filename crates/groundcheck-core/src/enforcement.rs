//! Enforcement policy: what happens to an answer that is not grounded.
//!
//! A small state machine per model response:
//!
//! ```text
//! INITIAL -> ACCEPTED
//! INITIAL -> FORCED_UNKNOWN
//! INITIAL -> RETRYING -> RESOLVED
//! INITIAL -> RETRYING -> FORCED_UNKNOWN_AFTER_RETRY
//! ```
//!
//! Regeneration is a caller-supplied `FnOnce` hook, so the one-retry budget
//! is structural: the engine cannot call it twice, and there is no retry
//! counter to misconfigure. These rules are governance machinery, not a
//! tuning toy.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::contract::{self, ParsedContract};
use crate::support::{compute_support, EvidenceSupportResult, Triple};

/// Sentinel answer substituted when grounding cannot be established.
pub const UNKNOWN_ANSWER: &str = "UNKNOWN";

/// Selectable enforcement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// Policy B: force the sentinel answer on any violation.
    #[serde(rename = "force_unknown_if_support_lt_0.5")]
    ForceUnknown,
    /// Policy R: retry once on violation, then force the sentinel answer if
    /// the retry is still violating.
    #[serde(rename = "retry_once_if_support_lt_0.5_else_force_unknown")]
    RetryOnce,
}

impl Policy {
    /// Canonical policy name, stable across runs for audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::ForceUnknown => "force_unknown_if_support_lt_0.5",
            Policy::RetryOnce => "retry_once_if_support_lt_0.5_else_force_unknown",
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a policy name does not match any known policy.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown enforcement policy: {0}")]
pub struct UnknownPolicy(String);

impl FromStr for Policy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "force_unknown_if_support_lt_0.5" => Ok(Policy::ForceUnknown),
            "retry_once_if_support_lt_0.5_else_force_unknown" => Ok(Policy::RetryOnce),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

/// What the policy did to the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    None,
    ForceUnknown,
    RetryResolved,
    RetryThenForceUnknown,
}

/// Failure reported by the caller's regeneration hook.
#[derive(Error, Debug)]
#[error("Regeneration failed: {0}")]
pub struct RegenerateError(pub String);

/// Final, auditable outcome of one enforcement pass.
///
/// Created once per model response; never retried more than once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnforcementDecision {
    pub action: Action,
    pub final_answer: String,
    pub retry_attempted: bool,
    pub support_before_retry: Option<f64>,
    pub support_after_retry: Option<f64>,
    /// Parsed answer of the retried response, when one was produced.
    pub retry_answer: Option<String>,
}

/// Run the enforcement state machine over a scored answer.
///
/// `regenerate` is consumed at most once, only under [`Policy::RetryOnce`]
/// and only when the first support is a violation. A hook error or
/// empty/unparseable retry output routes to
/// [`Action::RetryThenForceUnknown`]; it never aborts the decision.
///
/// `retrieved` and `key_tokens_k` must be the same values the first pass was
/// scored with, so the retried response is judged under identical semantics.
pub fn enforce<F>(
    parsed: &ParsedContract,
    support: &EvidenceSupportResult,
    policy: Policy,
    retrieved: &[Triple],
    key_tokens_k: usize,
    regenerate: F,
) -> EnforcementDecision
where
    F: FnOnce() -> Result<String, RegenerateError>,
{
    let support_before_retry = support.coverage;

    if !support.is_violation() {
        return EnforcementDecision {
            action: Action::None,
            final_answer: parsed.raw_answer.clone(),
            retry_attempted: false,
            support_before_retry,
            support_after_retry: None,
            retry_answer: None,
        };
    }

    match policy {
        Policy::ForceUnknown => {
            debug!(
                policy = policy.as_str(),
                support = ?support_before_retry,
                "grounding violation, forcing sentinel answer"
            );
            EnforcementDecision {
                action: Action::ForceUnknown,
                final_answer: UNKNOWN_ANSWER.to_string(),
                retry_attempted: false,
                support_before_retry,
                support_after_retry: None,
                retry_answer: None,
            }
        }
        Policy::RetryOnce => {
            debug!(
                policy = policy.as_str(),
                support = ?support_before_retry,
                "grounding violation, retrying once"
            );
            match regenerate() {
                Ok(raw_retry) if !raw_retry.trim().is_empty() => {
                    let parsed_retry = contract::parse(&raw_retry, retrieved.len());
                    let support_retry = compute_support(
                        &parsed_retry.raw_answer,
                        &parsed_retry.evidence_line_ids,
                        retrieved,
                        key_tokens_k,
                    );
                    let support_after_retry = support_retry.coverage;
                    if support_retry.is_violation() {
                        debug!(
                            support = ?support_after_retry,
                            "retry still violating, forcing sentinel answer"
                        );
                        EnforcementDecision {
                            action: Action::RetryThenForceUnknown,
                            final_answer: UNKNOWN_ANSWER.to_string(),
                            retry_attempted: true,
                            support_before_retry,
                            support_after_retry,
                            retry_answer: Some(parsed_retry.raw_answer),
                        }
                    } else {
                        debug!(support = ?support_after_retry, "retry resolved the violation");
                        EnforcementDecision {
                            action: Action::RetryResolved,
                            final_answer: parsed_retry.raw_answer.clone(),
                            retry_attempted: true,
                            support_before_retry,
                            support_after_retry,
                            retry_answer: Some(parsed_retry.raw_answer),
                        }
                    }
                }
                Ok(_) => {
                    debug!("retry produced empty output, forcing sentinel answer");
                    EnforcementDecision {
                        action: Action::RetryThenForceUnknown,
                        final_answer: UNKNOWN_ANSWER.to_string(),
                        retry_attempted: true,
                        support_before_retry,
                        support_after_retry: None,
                        retry_answer: None,
                    }
                }
                Err(err) => {
                    debug!(error = %err, "retry failed, forcing sentinel answer");
                    EnforcementDecision {
                        action: Action::RetryThenForceUnknown,
                        final_answer: UNKNOWN_ANSWER.to_string(),
                        retry_attempted: true,
                        support_before_retry,
                        support_after_retry: None,
                        retry_answer: None,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn triples(object: &str) -> Vec<Triple> {
        vec![Triple::new("France", "capital", object)]
    }

    fn parse_and_score(
        raw_text: &str,
        retrieved: &[Triple],
    ) -> (ParsedContract, EvidenceSupportResult) {
        let parsed = contract::parse(raw_text, retrieved.len());
        let support = compute_support(
            &parsed.raw_answer,
            &parsed.evidence_line_ids,
            retrieved,
            5,
        );
        (parsed, support)
    }

    fn no_retry_expected() -> impl FnOnce() -> Result<String, RegenerateError> {
        || panic!("regenerate must not be called")
    }

    #[test]
    fn test_grounded_answer_accepted_under_both_policies() {
        let retrieved = vec![Triple::new("I/G bit", "means", "Individual/Group")];
        let (parsed, support) = parse_and_score("ANSWER: Individual/Group\nEVIDENCE: 1", &retrieved);

        for policy in [Policy::ForceUnknown, Policy::RetryOnce] {
            let decision =
                enforce(&parsed, &support, policy, &retrieved, 5, no_retry_expected());
            assert_eq!(decision.action, Action::None);
            assert_eq!(decision.final_answer, "Individual/Group");
            assert!(!decision.retry_attempted);
            assert_eq!(decision.support_before_retry, Some(1.0));
        }
    }

    #[test]
    fn test_policy_b_forces_unknown_without_regenerating() {
        let retrieved = triples("Tokyo");
        let (parsed, support) = parse_and_score("ANSWER: Paris\nEVIDENCE: 1", &retrieved);
        assert_eq!(support.coverage, Some(0.0));

        let decision = enforce(
            &parsed,
            &support,
            Policy::ForceUnknown,
            &retrieved,
            5,
            no_retry_expected(),
        );
        assert_eq!(decision.action, Action::ForceUnknown);
        assert_eq!(decision.final_answer, UNKNOWN_ANSWER);
        assert!(!decision.retry_attempted);
    }

    #[test]
    fn test_policy_r_resolves_on_retry() {
        let retrieved = triples("Tokyo");
        let (parsed, support) = parse_and_score("ANSWER: Paris\nEVIDENCE: 1", &retrieved);

        let decision = enforce(&parsed, &support, Policy::RetryOnce, &retrieved, 5, || {
            Ok("ANSWER: Tokyo\nEVIDENCE: 1".to_string())
        });
        assert_eq!(decision.action, Action::RetryResolved);
        assert_eq!(decision.final_answer, "Tokyo");
        assert!(decision.retry_attempted);
        assert_eq!(decision.support_before_retry, Some(0.0));
        assert_eq!(decision.support_after_retry, Some(1.0));
        assert_eq!(decision.retry_answer.as_deref(), Some("Tokyo"));
    }

    #[test]
    fn test_policy_r_forces_unknown_when_retry_still_violates() {
        let retrieved = triples("Tokyo");
        let (parsed, support) = parse_and_score("ANSWER: Paris\nEVIDENCE: 1", &retrieved);

        let decision = enforce(&parsed, &support, Policy::RetryOnce, &retrieved, 5, || {
            Ok("ANSWER: London\nEVIDENCE: 1".to_string())
        });
        assert_eq!(decision.action, Action::RetryThenForceUnknown);
        assert_eq!(decision.final_answer, UNKNOWN_ANSWER);
        assert!(decision.retry_attempted);
        assert_eq!(decision.support_after_retry, Some(0.0));
        assert_eq!(decision.retry_answer.as_deref(), Some("London"));
    }

    #[test]
    fn test_policy_r_treats_hook_error_as_violation() {
        let retrieved = triples("Tokyo");
        let (parsed, support) = parse_and_score("ANSWER: Paris\nEVIDENCE: 1", &retrieved);

        let decision = enforce(&parsed, &support, Policy::RetryOnce, &retrieved, 5, || {
            Err(RegenerateError("backend timeout".to_string()))
        });
        assert_eq!(decision.action, Action::RetryThenForceUnknown);
        assert_eq!(decision.final_answer, UNKNOWN_ANSWER);
        assert!(decision.retry_attempted);
        assert_eq!(decision.support_after_retry, None);
        assert_eq!(decision.retry_answer, None);
    }

    #[test]
    fn test_policy_r_treats_empty_retry_output_as_violation() {
        let retrieved = triples("Tokyo");
        let (parsed, support) = parse_and_score("ANSWER: Paris\nEVIDENCE: 1", &retrieved);

        let decision = enforce(&parsed, &support, Policy::RetryOnce, &retrieved, 5, || {
            Ok("   \n ".to_string())
        });
        assert_eq!(decision.action, Action::RetryThenForceUnknown);
        assert_eq!(decision.support_after_retry, None);
    }

    #[test]
    fn test_unscorable_support_is_a_violation() {
        // No cited evidence at all: coverage is None, which must route to
        // the sentinel answer, never be coerced to a passing score.
        let retrieved = triples("Tokyo");
        let (parsed, support) = parse_and_score("ANSWER: Paris", &retrieved);
        assert_eq!(support.coverage, None);

        let decision = enforce(
            &parsed,
            &support,
            Policy::ForceUnknown,
            &retrieved,
            5,
            no_retry_expected(),
        );
        assert_eq!(decision.action, Action::ForceUnknown);
        assert_eq!(decision.support_before_retry, None);
    }

    #[test]
    fn test_regenerate_called_exactly_once_on_violation() {
        let retrieved = triples("Tokyo");
        let (parsed, support) = parse_and_score("ANSWER: Paris\nEVIDENCE: 1", &retrieved);

        let calls = Cell::new(0u32);
        let decision = enforce(&parsed, &support, Policy::RetryOnce, &retrieved, 5, || {
            calls.set(calls.get() + 1);
            Err(RegenerateError("still down".to_string()))
        });
        assert_eq!(calls.get(), 1);
        assert!(decision.retry_attempted);
    }

    #[test]
    fn test_regenerate_not_called_when_grounded() {
        let retrieved = triples("Tokyo");
        let (parsed, support) = parse_and_score("ANSWER: Tokyo\nEVIDENCE: 1", &retrieved);

        let calls = Cell::new(0u32);
        let decision = enforce(&parsed, &support, Policy::RetryOnce, &retrieved, 5, || {
            calls.set(calls.get() + 1);
            Ok(String::new())
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(decision.action, Action::None);
    }

    #[test]
    fn test_policy_round_trips_through_canonical_names() {
        for policy in [Policy::ForceUnknown, Policy::RetryOnce] {
            assert_eq!(policy.as_str().parse::<Policy>().unwrap(), policy);
            // serde uses the same canonical names as FromStr/Display.
            let json = serde_json::to_string(&policy).unwrap();
            assert_eq!(json, format!("\"{}\"", policy.as_str()));
        }
        assert!("clamp_to_zero".parse::<Policy>().is_err());
    }
}
