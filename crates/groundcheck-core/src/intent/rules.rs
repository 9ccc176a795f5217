//! Weighted matching rules, represented as data.
//!
//! Each rule entry compiles into a list of tagged matchers evaluated by one
//! dispatch function, rather than three near-identical matching paths. A
//! rule fires at most once per question regardless of how many of its
//! matchers hit; its weight is never double-counted.

use regex::Regex;

use crate::config::{ConfigError, RuleEntry};

/// One way a rule can hit a question.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Substring match on a keyword.
    Keyword(String),
    /// Substring match on a longer surface pattern.
    Pattern(String),
    /// Compiled regular expression.
    Regex(Regex),
}

impl Matcher {
    pub fn matches(&self, question: &str) -> bool {
        match self {
            Matcher::Keyword(s) | Matcher::Pattern(s) => {
                !s.is_empty() && question.contains(s.as_str())
            }
            Matcher::Regex(re) => re.is_match(question),
        }
    }
}

/// A compiled, immutable rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub rule_id: String,
    pub label: String,
    pub weight: f64,
    matchers: Vec<Matcher>,
}

impl Rule {
    /// True if any matcher hits. Keywords are tried before patterns before
    /// regexes; the first hit decides and the rest are skipped.
    pub fn fires(&self, question: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(question))
    }

    fn compile(entry: &RuleEntry) -> Result<Self, ConfigError> {
        let mut matchers: Vec<Matcher> = Vec::new();
        matchers.extend(entry.keywords.iter().cloned().map(Matcher::Keyword));
        matchers.extend(entry.patterns.iter().cloned().map(Matcher::Pattern));
        // `regex` first, then the legacy `regexes` alias.
        for pat in entry.regex.iter().chain(entry.regexes.iter()) {
            let compiled = Regex::new(pat).map_err(|source| ConfigError::InvalidRegex {
                rule_id: entry.id.clone(),
                source,
            })?;
            matchers.push(Matcher::Regex(compiled));
        }
        Ok(Self {
            rule_id: entry.id.clone(),
            label: entry.label.clone(),
            weight: entry.weight,
            matchers,
        })
    }
}

/// All compiled rules, in declaration order.
///
/// Declaration order matters: it is the first-seen order that breaks score
/// ties in the intent ranking.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(entries: &[RuleEntry]) -> Result<Self, ConfigError> {
        let rules = entries.iter().map(Rule::compile).collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, keywords: &[&str], patterns: &[&str], regex: &[&str]) -> RuleEntry {
        RuleEntry {
            id: id.to_string(),
            label: "L".to_string(),
            weight: 1.0,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            regex: regex.iter().map(|s| s.to_string()).collect(),
            regexes: Vec::new(),
        }
    }

    #[test]
    fn test_keyword_substring_fires() {
        let rule = Rule::compile(&entry("R1", &["how many"], &[], &[])).unwrap();
        assert!(rule.fires("how many members does the group have"));
        assert!(!rule.fires("what is the group"));
    }

    #[test]
    fn test_keyword_match_is_case_sensitive() {
        let rule = Rule::compile(&entry("R1", &["MAC"], &[], &[])).unwrap();
        assert!(rule.fires("what is the MAC address"));
        assert!(!rule.fires("what is the mac address"));
    }

    #[test]
    fn test_pattern_substring_fires() {
        let rule = Rule::compile(&entry("R1", &[], &["difference between"], &[])).unwrap();
        assert!(rule.fires("what is the difference between A and B"));
    }

    #[test]
    fn test_regex_fires() {
        let rule = Rule::compile(&entry("R1", &[], &[], &["\\bwhy\\b"])).unwrap();
        assert!(rule.fires("why does this happen"));
        assert!(!rule.fires("whyever"));
    }

    #[test]
    fn test_empty_keyword_never_fires() {
        let rule = Rule::compile(&entry("R1", &[""], &[], &[])).unwrap();
        assert!(!rule.fires("anything"));
    }

    #[test]
    fn test_legacy_regexes_alias_compiled() {
        let mut raw = entry("R1", &[], &[], &[]);
        raw.regexes = vec!["\\d+".to_string()];
        let rule = Rule::compile(&raw).unwrap();
        assert!(rule.fires("port 443"));
    }

    #[test]
    fn test_ruleset_preserves_declaration_order() {
        let entries = vec![
            entry("R1", &["a"], &[], &[]),
            entry("R2", &["b"], &[], &[]),
        ];
        let set = RuleSet::compile(&entries).unwrap();
        let ids: Vec<&str> = set.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2"]);
    }
}
