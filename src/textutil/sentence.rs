//! Sentence splitting.
//!
//! `spec.md` requires a deterministic sentence splitter for snippet
//! extraction, citation coverage, and confidence scoring but does not fix
//! the exact algorithm. This implementation uses an ASCII
//! sentence-boundary heuristic: a sentence ends at `.`/`!`/`?`, optionally
//! followed by a closing quote or parenthesis, followed by whitespace (or
//! end of text). It does not attempt abbreviation detection ("Dr.", "e.g.")
//! — good enough for generated-answer text, which this splitter is always
//! applied to, but not a general-purpose NLP sentence segmenter.

const SENTENCE_ENDERS: &[char] = &['.', '!', '?'];
const CLOSERS: &[char] = &['"', '\'', ')', ']'];

/// The minimum length, in characters, for a sentence to be considered
/// "substantial" for citation-coverage and confidence purposes.
pub const SUBSTANTIAL_SENTENCE_MIN_LEN: usize = 15;

/// Splits `text` into sentences, preserving each sentence's original
/// whitespace-trimmed slice.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let c = text[i..].chars().next().unwrap_or('\0');
        if SENTENCE_ENDERS.contains(&c) {
            let mut end = i + c.len_utf8();
            while end < bytes.len() {
                let next = text[end..].chars().next().unwrap_or('\0');
                if CLOSERS.contains(&next) {
                    end += next.len_utf8();
                } else {
                    break;
                }
            }
            let boundary_ok = end >= bytes.len()
                || text[end..]
                    .chars()
                    .next()
                    .is_some_and(char::is_whitespace);
            if boundary_ok {
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
                i = end;
                continue;
            }
        }
        i += c.len_utf8();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Whether a sentence is long enough to count toward citation coverage.
#[must_use]
pub fn is_substantial(sentence: &str) -> bool {
    sentence.trim().chars().count() > SUBSTANTIAL_SENTENCE_MIN_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_basic_punctuation() {
        let sentences = split_sentences("We chose Postgres. It scales well! Why not try it?");
        assert_eq!(
            sentences,
            vec![
                "We chose Postgres.",
                "It scales well!",
                "Why not try it?"
            ]
        );
    }

    #[test]
    fn handles_closing_quote_after_punctuation() {
        let sentences = split_sentences(r#"She said "it works." Then left."#);
        assert_eq!(sentences, vec![r#"She said "it works.""#, "Then left."]);
    }

    #[test]
    fn does_not_split_on_mid_sentence_period_without_whitespace() {
        let sentences = split_sentences("Version 1.5.2 shipped today.");
        assert_eq!(sentences, vec!["Version 1.5.2 shipped today."]);
    }

    #[test]
    fn single_sentence_without_terminal_punctuation_is_kept() {
        let sentences = split_sentences("no terminal punctuation here");
        assert_eq!(sentences, vec!["no terminal punctuation here"]);
    }

    #[test]
    fn substantial_length_threshold() {
        assert!(!is_substantial("Short."));
        assert!(is_substantial("This sentence is definitely long enough."));
    }
}
