//! Query-aware snippet extraction.
//!
//! Splits chunk text into sentences, scores each by how many query
//! keywords it contains, and keeps the best-fitting one (optionally
//! extended with a neighbor) within the configured character cap. Falls
//! back to the chunk's leading sentences, then to a hard word-boundary
//! truncation, when no sentence scores above zero or none fits.

use crate::textutil::split_sentences;

fn keyword_hits(sentence: &str, keywords: &[String]) -> usize {
    let lowered = sentence.to_lowercase();
    keywords.iter().filter(|k| lowered.contains(k.to_lowercase().as_str())).count()
}

/// Truncates `text` to at most `cap` characters at a word boundary,
/// appending an ellipsis if anything was cut.
fn truncate_with_ellipsis(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let ellipsis = "...";
    let budget = cap.saturating_sub(ellipsis.len());
    let mut truncated: String = text.chars().take(budget).collect();
    if let Some(last_space) = truncated.rfind(' ') {
        truncated.truncate(last_space);
    }
    truncated.push_str(ellipsis);
    truncated
}

/// Extracts a query-aware snippet from `text`, capped at `char_cap`
/// characters.
///
/// Picks the sentence with the most query-keyword hits; ties keep the
/// first (earliest) sentence. If an adjacent sentence still fits the cap
/// it is appended for context. A chunk with no sentence scoring above
/// zero, or whose best sentence doesn't fit, falls back to the leading
/// sentences truncated to the cap.
#[must_use]
pub fn extract_snippet(text: &str, keywords: &[String], char_cap: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return truncate_with_ellipsis(text.trim(), char_cap);
    }

    let best_idx = if keywords.is_empty() {
        None
    } else {
        sentences
            .iter()
            .enumerate()
            .map(|(i, s)| (i, keyword_hits(s, keywords)))
            .filter(|(_, hits)| *hits > 0)
            .max_by_key(|(i, hits)| (*hits, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
    };

    let Some(idx) = best_idx else {
        return fallback_from_start(&sentences, char_cap);
    };

    let mut snippet = sentences[idx].to_string();
    if snippet.chars().count() > char_cap {
        return truncate_with_ellipsis(sentences[idx], char_cap);
    }

    if idx + 1 < sentences.len() {
        let candidate = format!("{snippet} {}", sentences[idx + 1]);
        if candidate.chars().count() <= char_cap {
            snippet = candidate;
        }
    }

    snippet
}

fn fallback_from_start(sentences: &[&str], char_cap: usize) -> String {
    let mut snippet = String::new();
    for sentence in sentences {
        let candidate = if snippet.is_empty() {
            (*sentence).to_string()
        } else {
            format!("{snippet} {sentence}")
        };
        if candidate.chars().count() > char_cap {
            break;
        }
        snippet = candidate;
    }
    if snippet.is_empty() {
        truncate_with_ellipsis(sentences[0], char_cap)
    } else {
        snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_sentence_with_most_keyword_hits() {
        let text = "We discussed lunch plans. We chose Postgres for the database. It was a long meeting.";
        let keywords = vec!["postgres".to_string(), "database".to_string()];
        let snippet = extract_snippet(text, &keywords, 280);
        assert!(snippet.contains("Postgres"));
    }

    #[test]
    fn falls_back_to_leading_sentences_with_no_keyword_hits() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let keywords = vec!["nonexistent".to_string()];
        let snippet = extract_snippet(text, &keywords, 280);
        assert!(snippet.starts_with("First sentence here."));
    }

    #[test]
    fn truncates_oversized_best_sentence_with_ellipsis() {
        let long_sentence = "word ".repeat(100) + ".";
        let keywords = vec!["word".to_string()];
        let snippet = extract_snippet(&long_sentence, &keywords, 50);
        assert!(snippet.ends_with("..."));
        assert!(snippet.chars().count() <= 50);
    }

    #[test]
    fn extends_with_adjacent_sentence_when_it_fits() {
        let text = "We chose Postgres. It scales well.";
        let keywords = vec!["postgres".to_string()];
        let snippet = extract_snippet(text, &keywords, 280);
        assert_eq!(snippet, "We chose Postgres. It scales well.");
    }

    #[test]
    fn empty_text_produces_empty_snippet() {
        assert_eq!(extract_snippet("", &[], 280), String::new());
    }
}
