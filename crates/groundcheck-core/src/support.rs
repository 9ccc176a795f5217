//! Evidence-support scoring: is the answer grounded in what it cites?
//!
//! Coverage is the fraction of the answer's leading content tokens that
//! appear as substrings within the text of its cited evidence triples. A
//! substring test (not exact token membership) is used because
//! character-level CJK tokens are often sub-words of compound terms in the
//! context.
//!
//! `coverage == None` means grounding could not be assessed at all, which
//! downstream policy must treat as insufficient. It is never interchangeable
//! with `Some(0.0)` (computed, zero overlap).

use serde::{Deserialize, Serialize};

use crate::normalize::{mixed_segmentation, normalize_answer};

/// Number of leading answer tokens checked against the cited context.
pub const DEFAULT_KEY_TOKENS_K: usize = 5;

/// Coverage below this value (or no coverage at all) is a grounding
/// violation.
pub const SUPPORT_THRESHOLD: f64 = 0.5;

/// One retrieved knowledge-graph triple shown to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Flat text form used when building the cited context.
    fn as_text(&self) -> String {
        format!("{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// Result of scoring one answer against its cited evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceSupportResult {
    pub coverage: Option<f64>,
    pub support_ge_0_5: bool,
    pub key_tokens: Vec<String>,
    pub covered_tokens: Vec<String>,
    pub missing_tokens: Vec<String>,
}

impl EvidenceSupportResult {
    /// Grounding could not be assessed: empty answer, nothing cited, or no
    /// retrieved items.
    fn unscorable() -> Self {
        Self {
            coverage: None,
            support_ge_0_5: false,
            key_tokens: Vec::new(),
            covered_tokens: Vec::new(),
            missing_tokens: Vec::new(),
        }
    }

    /// A violation is a coverage that is absent or below
    /// [`SUPPORT_THRESHOLD`].
    pub fn is_violation(&self) -> bool {
        match self.coverage {
            None => true,
            Some(c) => c < SUPPORT_THRESHOLD,
        }
    }
}

/// Score how well `answer` is supported by the triples it cites.
///
/// `evidence_line_ids` are 1-based indices into `retrieved`. Pure and
/// side-effect free; called with identical semantics pre- and post-retry.
pub fn compute_support(
    answer: &str,
    evidence_line_ids: &[usize],
    retrieved: &[Triple],
    key_tokens_k: usize,
) -> EvidenceSupportResult {
    if answer.is_empty() || evidence_line_ids.is_empty() || retrieved.is_empty() {
        return EvidenceSupportResult::unscorable();
    }

    let norm_answer = normalize_answer(answer);
    let key_tokens: Vec<String> = mixed_segmentation(&norm_answer)
        .into_iter()
        .take(key_tokens_k)
        .collect();
    if key_tokens.is_empty() {
        return EvidenceSupportResult::unscorable();
    }

    let ctx_parts: Vec<String> = evidence_line_ids
        .iter()
        .filter_map(|&idx| {
            // 1-based id into the retrieved list; hand-built ids may
            // dangle even though parsed ids are range-checked.
            idx.checked_sub(1)
                .and_then(|j| retrieved.get(j))
                .map(Triple::as_text)
        })
        .collect();

    let norm_ctx = if ctx_parts.is_empty() {
        String::new()
    } else {
        normalize_answer(&ctx_parts.join(" "))
    };

    if norm_ctx.is_empty() {
        return EvidenceSupportResult {
            coverage: Some(0.0),
            support_ge_0_5: false,
            covered_tokens: Vec::new(),
            missing_tokens: key_tokens.clone(),
            key_tokens,
        };
    }

    let (covered_tokens, missing_tokens): (Vec<String>, Vec<String>) = key_tokens
        .iter()
        .cloned()
        .partition(|t| norm_ctx.contains(t.as_str()));
    let coverage = covered_tokens.len() as f64 / key_tokens.len() as f64;

    EvidenceSupportResult {
        coverage: Some(coverage),
        support_ge_0_5: coverage >= SUPPORT_THRESHOLD,
        key_tokens,
        covered_tokens,
        missing_tokens,
    }
}

/// One per-sample row fed into [`summarize_support`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportSample {
    pub id: String,
    pub raw_answer: String,
    pub evidence_line_ids: Vec<usize>,
    pub retrieved: Vec<Triple>,
}

/// Aggregate evidence support over a run.
///
/// Samples with `coverage == None` are excluded from every statistic; `n`
/// counts only scoreable rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportSummary {
    pub n: usize,
    pub key_tokens_k: usize,
    pub coverage_mean: f64,
    pub coverage_median: f64,
    pub support_rate_ge_0_5: f64,
    pub failure_case_ids: Vec<String>,
}

/// Aggregate per-sample support into run-level rates.
pub fn summarize_support(samples: &[SupportSample], key_tokens_k: usize) -> SupportSummary {
    let mut coverages: Vec<f64> = Vec::new();
    let mut failure_case_ids: Vec<String> = Vec::new();

    for s in samples {
        let support =
            compute_support(&s.raw_answer, &s.evidence_line_ids, &s.retrieved, key_tokens_k);
        let Some(cov) = support.coverage else {
            continue;
        };
        coverages.push(cov);
        if cov < SUPPORT_THRESHOLD {
            failure_case_ids.push(s.id.clone());
        }
    }

    let n = coverages.len();
    if n == 0 {
        return SupportSummary {
            n: 0,
            key_tokens_k,
            coverage_mean: 0.0,
            coverage_median: 0.0,
            support_rate_ge_0_5: 0.0,
            failure_case_ids: Vec::new(),
        };
    }

    let mut sorted = coverages.clone();
    sorted.sort_by(f64::total_cmp);
    // Upper median.
    let coverage_median = sorted[sorted.len() / 2];
    let coverage_mean = coverages.iter().sum::<f64>() / n as f64;
    let support_rate_ge_0_5 =
        coverages.iter().filter(|&&c| c >= SUPPORT_THRESHOLD).count() as f64 / n as f64;

    SupportSummary {
        n,
        key_tokens_k,
        coverage_mean,
        coverage_median,
        support_rate_ge_0_5,
        failure_case_ids,
    }
}
