//! Keyword extraction shared by the query analyzer and lexical search.
//!
//! Lexical search tokenizes with the same rule as the analyzer so that a
//! query's extracted keywords and a chunk's precomputed lexical terms are
//! directly comparable.

use super::stop_words::is_stop_word;

const MIN_KEYWORD_LEN: usize = 3;
const MAX_KEYWORDS: usize = 24;

/// Whether `token` looks like a preserved identifier: all-uppercase with
/// at least one underscore or digit, e.g. `API_KEY`, `RFC2119`.
#[must_use]
pub fn looks_like_identifier(token: &str) -> bool {
    token.chars().any(|c| c == '_')
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Extracts keywords from `text`: lowercases, strips punctuation, drops
/// stop words and sub-length tokens, deduplicates preserving first-seen
/// order, and caps the list at [`MAX_KEYWORDS`] — except that
/// uppercase-with-underscore identifiers are preserved verbatim (their
/// original case) and always kept even past the cap.
#[must_use]
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut identifiers = Vec::new();
    let mut keywords = Vec::new();

    for raw_token in text.split_whitespace() {
        let trimmed: String = raw_token
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if trimmed.is_empty() {
            continue;
        }

        if looks_like_identifier(&trimmed) {
            if !identifiers.contains(&trimmed) {
                identifiers.push(trimmed);
            }
            continue;
        }

        let lowered = trimmed.to_lowercase();
        if lowered.len() < MIN_KEYWORD_LEN || is_stop_word(&lowered) {
            continue;
        }
        if !keywords.contains(&lowered) {
            keywords.push(lowered);
        }
    }

    keywords.truncate(MAX_KEYWORDS.saturating_sub(identifiers.len()));
    identifiers.extend(keywords);
    identifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_stop_words_and_short_tokens() {
        let keywords = extract_keywords("what is the database we decided on");
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"is".to_string()));
        assert!(keywords.contains(&"database".to_string()));
        assert!(keywords.contains(&"decided".to_string()));
    }

    #[test]
    fn preserves_uppercase_identifiers_verbatim() {
        let keywords = extract_keywords("what does API_KEY_V2 do");
        assert!(keywords.contains(&"API_KEY_V2".to_string()));
    }

    #[test]
    fn deduplicates_preserving_order() {
        let keywords = extract_keywords("postgres postgres database");
        assert_eq!(keywords, vec!["postgres".to_string(), "database".to_string()]);
    }

    #[test]
    fn identifiers_survive_truncation() {
        let mut text = "ID_ONE ".repeat(1);
        for i in 0..30 {
            text.push_str(&format!("keyword{i} "));
        }
        let keywords = extract_keywords(&text);
        assert!(keywords.contains(&"ID_ONE".to_string()));
    }
}
