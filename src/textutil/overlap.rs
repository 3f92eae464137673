//! Keyword-set overlap scoring (Szymkiewicz-Simpson coefficient), shared
//! by lexical search scoring and the citation validator.

use std::collections::HashSet;

use crate::analyzer::tokenize::extract_keywords;

/// Size of the intersection of two keyword sets divided by the size of
/// the smaller set. `1.0` if either set is empty and the other isn't
/// would be undefined overlap, so an empty set yields `0.0`.
#[must_use]
pub fn min_based_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let smaller = a.len().min(b.len());
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / smaller as f64
    }
}

/// Extracts keywords from `text` into a set, for overlap scoring.
#[must_use]
pub fn keyword_set(text: &str) -> HashSet<String> {
    extract_keywords(text).into_iter().collect()
}

/// Overlap between two raw texts, tokenized with the shared keyword rule.
#[must_use]
pub fn text_overlap(a: &str, b: &str) -> f64 {
    min_based_overlap(&keyword_set(a), &keyword_set(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_full_overlap() {
        let score = text_overlap("postgresql primary storage", "postgresql primary storage");
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_text_has_zero_overlap() {
        let score = text_overlap("postgresql database", "weather forecast today");
        assert!(score.abs() < 1e-9);
    }

    #[test]
    fn partial_overlap_uses_smaller_set_denominator() {
        let a: HashSet<String> = ["alpha", "beta"].iter().map(|s| (*s).to_string()).collect();
        let b: HashSet<String> = ["alpha", "beta", "gamma", "delta"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        // intersection = 2, smaller set size = 2 => overlap = 1.0
        assert!((min_based_overlap(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_set_has_zero_overlap() {
        let empty = HashSet::new();
        let other = keyword_set("postgresql database");
        assert_eq!(min_based_overlap(&empty, &other), 0.0);
    }
}
