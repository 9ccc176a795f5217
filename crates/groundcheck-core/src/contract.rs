//! Parsing of the two-line `ANSWER:` / `EVIDENCE:` output contract.
//!
//! Generation models are instructed to reply with exactly two lines:
//!
//! ```text
//! ANSWER: <short answer>
//! EVIDENCE: <comma-separated 1-based line numbers>
//! ```
//!
//! Real model output is frequently malformed, partial, or adversarial, so
//! parsing never fails: every irregularity degrades to a boolean flag on
//! [`ParsedContract`] and callers build statistics from the flags.

use serde::{Deserialize, Serialize};

const ANSWER_PREFIX: &str = "ANSWER:";
const EVIDENCE_PREFIX: &str = "EVIDENCE:";

/// Normalized view of one model response against the output contract.
///
/// `evidence_line_ids` holds only valid indices: deduplicated, ascending,
/// each within `[1, retrieved_k]`. Out-of-range indices are dropped (never
/// clamped) and recorded via `evidence_out_of_range`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedContract {
    pub raw_answer: String,
    pub evidence_line_ids: Vec<usize>,
    pub has_answer_line: bool,
    pub has_evidence_line: bool,
    pub evidence_empty: bool,
    pub evidence_out_of_range: bool,
    pub evidence_has_duplicate: bool,
}

/// Parse raw model text into a [`ParsedContract`].
///
/// `retrieved_k` is the number of evidence items actually shown to the model
/// for this call; it defines the valid citation range `[1, retrieved_k]`.
pub fn parse(raw_text: &str, retrieved_k: usize) -> ParsedContract {
    let raw = raw_text.trim();
    if raw.is_empty() {
        return ParsedContract {
            raw_answer: String::new(),
            evidence_line_ids: Vec::new(),
            has_answer_line: false,
            has_evidence_line: false,
            evidence_empty: true,
            evidence_out_of_range: false,
            evidence_has_duplicate: false,
        };
    }

    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|ln| !ln.is_empty())
        .collect();

    // ANSWER line: only its remainder feeds downstream scoring. Without one,
    // the whole response stands in as the answer.
    let mut raw_answer = raw.to_string();
    let mut has_answer_line = false;
    for ln in &lines {
        if let Some(rest) = strip_prefix_ci(ln, ANSWER_PREFIX) {
            raw_answer = rest.trim().to_string();
            has_answer_line = true;
            break;
        }
    }

    let mut evidence_ids: Vec<usize> = Vec::new();
    let mut has_evidence_line = false;
    let mut evidence_empty = false;
    let mut evidence_out_of_range = false;
    let mut evidence_has_duplicate = false;

    for ln in &lines {
        if let Some(rest) = strip_prefix_ci(ln, EVIDENCE_PREFIX) {
            has_evidence_line = true;
            let payload = rest.trim();
            if payload.is_empty() {
                evidence_empty = true;
                break;
            }
            // Models trained on CJK corpora emit full-width commas.
            let payload = payload.replace('，', ",");
            let mut seen_raw: Vec<i64> = Vec::new();
            for tok in payload.split(',') {
                let tok = tok.trim();
                if tok.is_empty() {
                    continue;
                }
                // Non-integer tokens are ignored without setting any flag.
                let idx: i64 = match tok.parse() {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                seen_raw.push(idx);
                if idx < 1 || idx as usize > retrieved_k {
                    evidence_out_of_range = true;
                    continue;
                }
                evidence_ids.push(idx as usize);
            }
            // Duplicates are judged on the raw token list, before the range
            // filter drops anything.
            let mut uniq = seen_raw.clone();
            uniq.sort_unstable();
            uniq.dedup();
            if uniq.len() != seen_raw.len() {
                evidence_has_duplicate = true;
            }
            break;
        }
    }

    evidence_ids.sort_unstable();
    evidence_ids.dedup();

    ParsedContract {
        raw_answer,
        evidence_line_ids: evidence_ids,
        has_answer_line,
        has_evidence_line,
        evidence_empty,
        evidence_out_of_range,
        evidence_has_duplicate,
    }
}

/// Case-insensitive ASCII prefix strip. Returns the remainder when `line`
/// starts with `prefix` under ASCII case folding.
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}
