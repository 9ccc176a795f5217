//! Engine configuration: taxonomy, weighted rules, thresholds, conflict
//! matrix, clarification templates.
//!
//! Configuration arrives as two declarative tables (a label taxonomy and a
//! rule table), either as already-parsed structs or through the YAML/JSON
//! convenience constructors. An [`EngineConfig`] is validated and
//! fingerprinted at construction and never mutated afterwards; predictions
//! and enforcement decisions borrow it read-only.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::audit::{self, AuditInfo};
use crate::intent::RuleSet;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid rule {rule_id}: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("Duplicate rule ID: {0}")]
    DuplicateRuleId(String),

    #[error("Invalid regex in rule {rule_id}: {source}")]
    InvalidRegex {
        rule_id: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to fingerprint config: {0}")]
    Fingerprint(#[source] serde_json::Error),
}

/// One taxonomy label with its documentation material. Consulted for
/// self-tests and fingerprints, not at prediction time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxonomyEntry {
    pub name: String,

    #[serde(default)]
    pub definition: String,

    #[serde(default)]
    pub examples: Vec<String>,

    #[serde(default)]
    pub negative_examples: Vec<String>,
}

/// The label taxonomy table.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Taxonomy {
    #[serde(default)]
    pub intent_labels: Vec<TaxonomyEntry>,
}

/// One declarative rule entry, before matcher compilation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleEntry {
    pub id: String,
    pub label: String,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub regex: Vec<String>,

    /// Legacy alias, accepted alongside `regex` and appended after it.
    #[serde(default)]
    pub regexes: Vec<String>,
}

fn default_weight() -> f64 {
    1.0
}

/// Decision thresholds for multi-intent and ambiguity detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    #[serde(default = "default_multi_label_threshold")]
    pub multi_label_threshold: f64,

    #[serde(default = "default_ambiguous_margin")]
    pub ambiguous_margin: f64,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_multi_label_threshold() -> f64 {
    0.6
}

fn default_ambiguous_margin() -> f64 {
    0.15
}

fn default_min_confidence() -> f64 {
    0.4
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            multi_label_threshold: default_multi_label_threshold(),
            ambiguous_margin: default_ambiguous_margin(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// Rule/model fusion weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelFusion {
    /// Weight of the rule score; the model score gets `1 - alpha_rule`.
    #[serde(default = "default_alpha_rule")]
    pub alpha_rule: f64,
}

fn default_alpha_rule() -> f64 {
    0.5
}

impl Default for ModelFusion {
    fn default() -> Self {
        Self {
            alpha_rule: default_alpha_rule(),
        }
    }
}

/// The rule table: rules plus every prediction-time knob.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RulesConfig {
    #[serde(default)]
    pub rules: Vec<RuleEntry>,

    #[serde(default)]
    pub thresholds: Thresholds,

    /// Pairs of labels that are mutually exclusive in principle.
    #[serde(default)]
    pub conflict_matrix: Vec<Vec<String>>,

    /// Keyed by `"{A}_vs_{B}"` or `"generic"`; the generic template may
    /// contain a `{candidates}` placeholder.
    #[serde(default)]
    pub clarification_templates: HashMap<String, String>,

    #[serde(default)]
    pub model_fusion: ModelFusion,
}

/// Unordered pair of mutually exclusive labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictPair(pub String, pub String);

impl ConflictPair {
    /// Symmetric membership test: `(A,B)` equals `(B,A)`.
    pub fn matches(&self, a: &str, b: &str) -> bool {
        (self.0 == a && self.1 == b) || (self.0 == b && self.1 == a)
    }
}

/// Serializable view of the effective configuration, hashed into the audit
/// fingerprint.
#[derive(Serialize)]
struct EffectiveConfig<'a> {
    taxonomy: &'a Taxonomy,
    rules: &'a RulesConfig,
    thresholds: &'a Thresholds,
}

/// Immutable engine configuration, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub taxonomy: Taxonomy,
    pub rules: RuleSet,
    pub thresholds: Thresholds,
    pub conflict_pairs: Vec<ConflictPair>,
    pub clarification_templates: HashMap<String, String>,
    pub model_fusion: ModelFusion,
    fingerprint: String,
}

impl EngineConfig {
    /// Build from already-parsed tables, validating and fingerprinting.
    pub fn from_parts(taxonomy: Taxonomy, rules_cfg: RulesConfig) -> Result<Self, ConfigError> {
        validate_rule_entries(&rules_cfg.rules)?;

        // A rule may score a label the taxonomy does not document. Worth a
        // warning, not a rejection: predictions never consult the taxonomy.
        let known: HashSet<&str> = taxonomy
            .intent_labels
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        for entry in &rules_cfg.rules {
            if !known.contains(entry.label.as_str()) {
                warn!(
                    rule_id = %entry.id,
                    label = %entry.label,
                    "rule label not present in taxonomy"
                );
            }
        }

        let fingerprint = audit::fingerprint(&EffectiveConfig {
            taxonomy: &taxonomy,
            rules: &rules_cfg,
            thresholds: &rules_cfg.thresholds,
        })
        .map_err(ConfigError::Fingerprint)?;

        let rules = RuleSet::compile(&rules_cfg.rules)?;
        let conflict_pairs = build_conflict_pairs(&rules_cfg.conflict_matrix);

        debug!(
            rules = rules.len(),
            labels = taxonomy.intent_labels.len(),
            fingerprint = %fingerprint,
            "engine config loaded"
        );

        Ok(Self {
            taxonomy,
            rules,
            thresholds: rules_cfg.thresholds,
            conflict_pairs,
            clarification_templates: rules_cfg.clarification_templates,
            model_fusion: rules_cfg.model_fusion,
            fingerprint,
        })
    }

    /// Parse both tables from YAML strings.
    pub fn from_yaml(taxonomy_yaml: &str, rules_yaml: &str) -> Result<Self, ConfigError> {
        let taxonomy: Taxonomy = serde_yaml::from_str(taxonomy_yaml)?;
        let rules_cfg: RulesConfig = serde_yaml::from_str(rules_yaml)?;
        Self::from_parts(taxonomy, rules_cfg)
    }

    /// Parse both tables from JSON strings.
    pub fn from_json(taxonomy_json: &str, rules_json: &str) -> Result<Self, ConfigError> {
        let taxonomy: Taxonomy = serde_json::from_str(taxonomy_json)?;
        let rules_cfg: RulesConfig = serde_json::from_str(rules_json)?;
        Self::from_parts(taxonomy, rules_cfg)
    }

    /// Parse both tables from YAML files.
    pub fn from_yaml_files(
        taxonomy_path: impl AsRef<Path>,
        rules_path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let taxonomy = fs::read_to_string(taxonomy_path)?;
        let rules = fs::read_to_string(rules_path)?;
        Self::from_yaml(&taxonomy, &rules)
    }

    /// SHA-256 fingerprint of the effective configuration.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Audit record for run manifests.
    pub fn audit_info(&self) -> AuditInfo {
        AuditInfo {
            thresholds: self.thresholds,
            config_fingerprint: self.fingerprint.clone(),
        }
    }
}

fn validate_rule_entries(entries: &[RuleEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.id.is_empty() {
            return Err(ConfigError::InvalidRule {
                rule_id: "<empty>".to_string(),
                reason: "rule id must be non-empty".to_string(),
            });
        }
        if !seen.insert(&entry.id) {
            return Err(ConfigError::DuplicateRuleId(entry.id.clone()));
        }
        if entry.label.is_empty() {
            return Err(ConfigError::InvalidRule {
                rule_id: entry.id.clone(),
                reason: "label must be non-empty".to_string(),
            });
        }
        if !(entry.weight > 0.0) {
            return Err(ConfigError::InvalidRule {
                rule_id: entry.id.clone(),
                reason: format!("weight must be positive, got {}", entry.weight),
            });
        }
    }
    Ok(())
}

/// Pairs with the wrong arity are skipped, not rejected.
fn build_conflict_pairs(raw: &[Vec<String>]) -> Vec<ConflictPair> {
    let mut pairs = Vec::new();
    for p in raw {
        if let [a, b] = p.as_slice() {
            pairs.push(ConflictPair(a.clone(), b.clone()));
        } else {
            debug!(entry = ?p, "skipping conflict_matrix entry with arity != 2");
        }
    }
    pairs
}
