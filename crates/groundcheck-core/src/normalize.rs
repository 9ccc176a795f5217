//! Shared text normalization for answer/evidence comparison.
//!
//! Answers and cited evidence text must be normalized identically before
//! coverage is computed, otherwise the substring test in the support scorer
//! is meaningless. Both sides go through [`normalize_answer`] followed by
//! [`mixed_segmentation`].

use std::collections::HashSet;

use lazy_static::lazy_static;

lazy_static! {
    /// CJK punctuation stripped alongside ASCII punctuation.
    static ref CJK_PUNCTUATION: HashSet<char> =
        "，。！？【】（）《》“”、：；".chars().collect();
}

/// Normalize free text: lowercase, strip ASCII and CJK punctuation,
/// collapse runs of whitespace to single spaces.
pub fn normalize_answer(s: &str) -> String {
    let lowered = s.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !CJK_PUNCTUATION.contains(c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokenize normalized text with a mixed segmentation rule.
///
/// If the text contains any CJK ideograph, split into individual characters
/// (character-level); compound terms in KG labels often embed single-character
/// answer tokens as sub-words, which the substring coverage test relies on.
/// Otherwise split on whitespace (word-level).
pub fn mixed_segmentation(text: &str) -> Vec<String> {
    if text.chars().any(is_cjk_ideograph) {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect()
    } else {
        text.split_whitespace().map(str::to_string).collect()
    }
}

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_strips_punctuation() {
        assert_eq!(normalize_answer("The  Answer, please!"), "the answer please");
        assert_eq!(normalize_answer("Individual/Group"), "individualgroup");
    }

    #[test]
    fn test_normalize_strips_cjk_punctuation() {
        assert_eq!(normalize_answer("以太网，帧。"), "以太网帧");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_answer("  a \t b \n c  "), "a b c");
    }

    #[test]
    fn test_word_level_segmentation() {
        assert_eq!(
            mixed_segmentation("destination mac address"),
            vec!["destination", "mac", "address"]
        );
    }

    #[test]
    fn test_character_level_segmentation_for_cjk() {
        assert_eq!(mixed_segmentation("目的 地址"), vec!["目", "的", "地", "址"]);
    }

    #[test]
    fn test_mixed_text_goes_character_level() {
        // A single ideograph flips the whole string to character-level.
        assert_eq!(mixed_segmentation("mac 地址"), vec!["m", "a", "c", "地", "址"]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_answer(""), "");
        assert!(mixed_segmentation("").is_empty());
    }
}
