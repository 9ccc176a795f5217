//! Rule-based multi-label intent prediction with optional model fusion.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audit::AuditInfo;
use crate::config::EngineConfig;

/// Synthetic label emitted when neither rules nor the model produce any
/// signal for a question.
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Capability interface for an externally trained classifier.
///
/// `decision_scores` returns raw per-label margins aligned to
/// `label_order`; the engine maps them through a sigmoid before fusion.
pub trait ScoreProvider {
    fn label_order(&self) -> &[String];
    fn decision_scores(&self, question: &str) -> Vec<f64>;
}

/// Null object used when no trained classifier is available. Pure rule
/// mode: fused scores equal rule scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullModel;

impl ScoreProvider for NullModel {
    fn label_order(&self) -> &[String] {
        &[]
    }

    fn decision_scores(&self, _question: &str) -> Vec<f64> {
        Vec::new()
    }
}

/// A rule that contributed to a label's score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggeredRule {
    pub rule_id: String,
    pub weight: f64,
}

/// One ranked intent label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub label: String,
    pub score: f64,
    pub evidence_rules_triggered: Vec<TriggeredRule>,
}

/// Ranked multi-label prediction for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentPrediction {
    /// Sorted descending by score; the maximum score is 1.0 unless every
    /// raw and model score was zero.
    pub intents: Vec<Intent>,
    pub is_multi_intent: bool,
    pub is_ambiguous: bool,
    pub clarification_question: Option<String>,
    pub clarification_options: Option<Vec<String>>,
}

impl IntentPrediction {
    /// Empty question: nothing to classify, no sentinel.
    fn empty() -> Self {
        Self {
            intents: Vec::new(),
            is_multi_intent: false,
            is_ambiguous: false,
            clarification_question: None,
            clarification_options: None,
        }
    }

    /// No rule fired and no model signal: single `UNKNOWN` sentinel.
    fn unknown() -> Self {
        Self {
            intents: vec![Intent {
                label: UNKNOWN_LABEL.to_string(),
                score: 0.0,
                evidence_rules_triggered: Vec::new(),
            }],
            is_multi_intent: false,
            is_ambiguous: false,
            clarification_question: None,
            clarification_options: None,
        }
    }
}

/// Rule-based, auditable intent classifier.
///
/// Borrows the shared [`EngineConfig`]; many engines (or many threads) may
/// share one config because it is never written after construction.
pub struct IntentEngine<'cfg> {
    config: &'cfg EngineConfig,
    model: Box<dyn ScoreProvider + Send + Sync + 'cfg>,
}

impl<'cfg> IntentEngine<'cfg> {
    /// Pure rule mode.
    pub fn new(config: &'cfg EngineConfig) -> Self {
        Self {
            config,
            model: Box::new(NullModel),
        }
    }

    /// Rule scoring fused with a trained classifier's scores.
    pub fn with_model(
        config: &'cfg EngineConfig,
        model: Box<dyn ScoreProvider + Send + Sync + 'cfg>,
    ) -> Self {
        Self { config, model }
    }

    /// Audit record for the configuration this engine predicts with.
    pub fn audit_info(&self) -> AuditInfo {
        self.config.audit_info()
    }

    /// Score a question against all rules and emit a ranked multi-label
    /// prediction with multi-intent/ambiguity flags.
    pub fn predict(&self, question: &str) -> IntentPrediction {
        let q = question.trim();
        if q.is_empty() {
            return IntentPrediction::empty();
        }

        // First-seen label order; stable sort keeps it as the tiebreak for
        // equal scores.
        let mut order: Vec<String> = Vec::new();
        let mut raw_scores: HashMap<String, f64> = HashMap::new();
        let mut triggered: HashMap<String, Vec<TriggeredRule>> = HashMap::new();

        for rule in self.config.rules.iter() {
            if !rule.fires(q) {
                continue;
            }
            if !raw_scores.contains_key(&rule.label) {
                order.push(rule.label.clone());
            }
            *raw_scores.entry(rule.label.clone()).or_insert(0.0) += rule.weight;
            triggered
                .entry(rule.label.clone())
                .or_default()
                .push(TriggeredRule {
                    rule_id: rule.rule_id.clone(),
                    weight: rule.weight,
                });
        }

        let mut model_scores: HashMap<String, f64> = HashMap::new();
        let model_labels = self.model.label_order();
        if !model_labels.is_empty() {
            let margins = self.model.decision_scores(q);
            for (label, margin) in model_labels.iter().zip(margins) {
                if !raw_scores.contains_key(label) && !model_scores.contains_key(label) {
                    order.push(label.clone());
                }
                model_scores.insert(label.clone(), sigmoid(margin));
            }
        }

        if raw_scores.is_empty() && model_scores.is_empty() {
            debug!(question = q, "no rule or model signal, emitting UNKNOWN");
            return IntentPrediction::unknown();
        }

        // Fuse over the label union; with no model signal the rule scores
        // pass through unchanged.
        let alpha = self.config.model_fusion.alpha_rule;
        let mut scored: Vec<(String, f64)> = order
            .iter()
            .map(|label| {
                let r = raw_scores.get(label).copied().unwrap_or(0.0);
                let m = model_scores.get(label).copied().unwrap_or(0.0);
                let fused = if model_scores.is_empty() {
                    r
                } else {
                    alpha * r + (1.0 - alpha) * m
                };
                (label.clone(), fused)
            })
            .collect();

        // Normalize so the best label for this question scores 1.0.
        let max_score = scored.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
        for (_, s) in scored.iter_mut() {
            *s = if max_score > 0.0 { *s / max_score } else { 0.0 };
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let intents: Vec<Intent> = scored
            .iter()
            .map(|(label, score)| Intent {
                label: label.clone(),
                score: *score,
                evidence_rules_triggered: triggered.get(label).cloned().unwrap_or_default(),
            })
            .collect();

        let (is_multi_intent, is_ambiguous) = self.decide_multi_and_ambiguous(&scored);
        let (clarification_question, clarification_options) = if is_ambiguous {
            self.make_clarification(&scored)
        } else {
            (None, None)
        };

        IntentPrediction {
            intents,
            is_multi_intent,
            is_ambiguous,
            clarification_question,
            clarification_options,
        }
    }

    fn decide_multi_and_ambiguous(&self, scored: &[(String, f64)]) -> (bool, bool) {
        let th = &self.config.thresholds;

        let n_active = scored
            .iter()
            .filter(|(_, s)| *s >= th.multi_label_threshold)
            .count();
        let is_multi = n_active >= 2;

        let Some((top1_label, top1)) = scored.first() else {
            return (false, false);
        };
        let top2 = scored.get(1);

        let mut is_ambiguous = false;

        // Close race between the top two labels.
        if let Some((_, s2)) = top2 {
            if top1 - s2 <= th.ambiguous_margin {
                is_ambiguous = true;
            }
        }

        // Overall confidence too low.
        if *top1 < th.min_confidence {
            is_ambiguous = true;
        }

        // Top two labels are declared mutually exclusive and close.
        if let Some((top2_label, s2)) = top2 {
            let conflicting = self
                .config
                .conflict_pairs
                .iter()
                .any(|p| p.matches(top1_label, top2_label));
            if conflicting && (top1 - s2).abs() <= th.ambiguous_margin {
                is_ambiguous = true;
            }
        }

        (is_multi, is_ambiguous)
    }

    /// Clarification question and candidate labels for an ambiguous
    /// prediction.
    fn make_clarification(
        &self,
        scored: &[(String, f64)],
    ) -> (Option<String>, Option<Vec<String>>) {
        let candidates: Vec<String> = scored
            .iter()
            .filter(|(_, s)| *s > 0.0)
            .take(3)
            .map(|(label, _)| label.clone())
            .collect();
        if candidates.is_empty() {
            return (None, None);
        }

        let templates = &self.config.clarification_templates;
        let mut question = None;
        if let [a, b, ..] = candidates.as_slice() {
            let key = format!("{a}_vs_{b}");
            let key_rev = format!("{b}_vs_{a}");
            question = templates.get(&key).or_else(|| templates.get(&key_rev)).cloned();
        }
        if question.is_none() {
            if let Some(generic) = templates.get("generic") {
                question = Some(generic.replace("{candidates}", &candidates.join(", ")));
            }
        }

        match question {
            Some(q) => (Some(q), Some(candidates)),
            None => (None, None),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
