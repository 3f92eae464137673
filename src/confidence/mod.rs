//! Confidence Scorer: four weighted sub-scores compressed into the
//! enhanced five-level confidence, then collapsed to the legacy
//! four-level scheme callers see.
//!
//! A separate, optional per-citation scorer judges individual
//! claim-citation pairs; it is off by default since it adds an extra
//! pass over every citation for a signal the aggregate score usually
//! already carries.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::PipelineConfig;
use crate::core::answer::{ConfidenceLevel, EnhancedConfidence};
use crate::core::query::Intent;
use crate::textutil::overlap::{keyword_set, min_based_overlap};
use crate::textutil::sentence::{is_substantial, split_sentences};

#[allow(clippy::unwrap_used)]
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());
#[allow(clippy::unwrap_used)]
static ABSOLUTE_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(always|never|every|all|none|must|only)\b").unwrap());
#[allow(clippy::unwrap_used)]
static VERB_PATTERN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(is|are|was|were|has|have|had|will|did)\b").unwrap());
#[allow(clippy::unwrap_used)]
static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

const UNCERTAINTY_PHRASES: &[&str] = &[
    "don't have",
    "do not have",
    "no notes about",
    "i don't know",
    "i do not know",
    "cannot find",
    "can't find",
    "couldn't find",
    "could not find",
    "no information",
];

const WEIGHT_CITATION_DENSITY: f64 = 0.25;
const WEIGHT_SOURCE_RELEVANCE: f64 = 0.30;
const WEIGHT_ANSWER_COHERENCE: f64 = 0.20;
const WEIGHT_CLAIM_SUPPORT: f64 = 0.25;

const DENSITY_PEAK: f64 = 0.7;
const VERY_SHORT_ANSWER_CHARS: usize = 40;

/// The four sub-scores behind one composite confidence value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBreakdown {
    /// Ratio of cited substantial sentences to total, peaked at 0.7.
    pub citation_density: f64,
    /// Mean relevance of cited chunks, normalized by the relevance floor.
    pub source_relevance: f64,
    /// 1.0 minus structural-quality penalties.
    pub answer_coherence: f64,
    /// Fraction of factual-looking sentences carrying a citation.
    pub claim_support: f64,
    /// The weighted sum of the four sub-scores above.
    pub composite: f64,
}

/// Final confidence result for one answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceOutcome {
    /// Five-level internal confidence derived from `breakdown.composite`.
    pub enhanced: EnhancedConfidence,
    /// Four-level confidence exposed externally, with `None` reserved for
    /// zero citations or an uncertainty-acknowledging answer.
    pub legacy: ConfidenceLevel,
    /// The sub-scores behind `enhanced`.
    pub breakdown: ConfidenceBreakdown,
}

/// Whether `text` reads as the model acknowledging it found no relevant
/// notes, rather than asserting an answer. Used both to force `legacy`
/// confidence to [`ConfidenceLevel::None`] here and, upstream, to tell an
/// uncertainty acknowledgement apart from a genuine no-evidence failure.
#[must_use]
pub fn is_uncertainty_acknowledgement(text: &str) -> bool {
    let lowered = text.to_lowercase();
    UNCERTAINTY_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn citation_density(substantial_sentences: &[&str]) -> f64 {
    if substantial_sentences.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let cited = substantial_sentences
        .iter()
        .filter(|s| MARKER_RE.is_match(s))
        .count() as f64;
    #[allow(clippy::cast_precision_loss)]
    let ratio = cited / substantial_sentences.len() as f64;

    let distance = (ratio - DENSITY_PEAK).abs();
    let half_width = if ratio <= DENSITY_PEAK { DENSITY_PEAK } else { 1.0 - DENSITY_PEAK + 0.3 };
    (1.0 - distance / half_width).clamp(0.0, 1.0)
}

fn source_relevance(cited_scores: &[f64], relevance_floor: f64) -> f64 {
    if cited_scores.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = cited_scores.iter().sum::<f64>() / cited_scores.len() as f64;
    if (1.0 - relevance_floor).abs() < f64::EPSILON {
        return if mean >= relevance_floor { 1.0 } else { 0.0 };
    }
    ((mean - relevance_floor) / (1.0 - relevance_floor)).clamp(0.0, 1.0)
}

fn has_marker_cluster(text: &str, min_cluster: usize) -> bool {
    let mut run = 0usize;
    let mut last_end = 0usize;
    for m in MARKER_RE.find_iter(text) {
        let gap = &text[last_end..m.start()];
        if gap.trim().is_empty() && last_end != 0 {
            run += 1;
        } else {
            run = 1;
        }
        if run >= min_cluster {
            return true;
        }
        last_end = m.end();
    }
    false
}

fn marker_alone_on_line(text: &str) -> bool {
    text.lines().any(|line| {
        let stripped = MARKER_RE.replace_all(line, "");
        !line.trim().is_empty() && stripped.trim().is_empty()
    })
}

fn answer_coherence(text: &str, intent: Intent) -> f64 {
    let mut score = 1.0;

    let trimmed = text.trim_end();
    if !trimmed.ends_with(['.', '!', '?', '"', '\'']) {
        score -= 0.15;
    }
    if marker_alone_on_line(text) {
        score -= 0.15;
    }
    if has_marker_cluster(text, 4) {
        score -= 0.2;
    }
    if text.trim().chars().count() < VERY_SHORT_ANSWER_CHARS {
        score -= 0.2;
    }
    if matches!(intent, Intent::List | Intent::ActionItem) {
        let has_list_markup = text.lines().any(|l| {
            let t = l.trim_start();
            t.starts_with('-') || t.starts_with('*') || t.chars().next().is_some_and(|c| c.is_ascii_digit())
        });
        if !has_list_markup {
            score -= 0.2;
        }
    }

    score.clamp(0.0, 1.0)
}

fn looks_factual(sentence: &str) -> bool {
    DIGIT_RE.is_match(sentence) || ABSOLUTE_WORD_RE.is_match(sentence) || VERB_PATTERN_RE.is_match(sentence)
}

fn claim_support(sentences: &[&str]) -> f64 {
    let factual: Vec<&&str> = sentences.iter().filter(|s| looks_factual(s)).collect();
    if factual.is_empty() {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let cited = factual.iter().filter(|s| MARKER_RE.is_match(**s)).count() as f64;
    #[allow(clippy::cast_precision_loss)]
    {
        cited / factual.len() as f64
    }
}

/// Scores one finalized answer. `cited_chunk_scores` are the fused
/// relevance scores of the chunks actually cited (post-renumbering),
/// `citation_markers` the external marker numbers present in `text`.
#[must_use]
pub fn score(
    text: &str,
    citation_markers: &[u32],
    cited_chunk_scores: &[f64],
    intent: Intent,
    config: &PipelineConfig,
) -> ConfidenceOutcome {
    let sentences = split_sentences(text);
    let substantial: Vec<&str> = sentences.iter().copied().filter(|s| is_substantial(s)).collect();

    let density = citation_density(&substantial);
    let relevance = source_relevance(cited_chunk_scores, config.confidence_relevance_floor);
    let coherence = answer_coherence(text, intent);
    let support = claim_support(&sentences);

    let composite = WEIGHT_CITATION_DENSITY * density
        + WEIGHT_SOURCE_RELEVANCE * relevance
        + WEIGHT_ANSWER_COHERENCE * coherence
        + WEIGHT_CLAIM_SUPPORT * support;

    let enhanced = EnhancedConfidence::from_score(composite);
    let legacy = if citation_markers.is_empty() || is_uncertainty_acknowledgement(text) {
        ConfidenceLevel::None
    } else {
        enhanced.to_legacy()
    };

    ConfidenceOutcome {
        enhanced,
        legacy,
        breakdown: ConfidenceBreakdown {
            citation_density: density,
            source_relevance: relevance,
            answer_coherence: coherence,
            claim_support: support,
            composite,
        },
    }
}

/// One claim-citation pair's support score, from the optional per-citation
/// scorer. `semantic_cosine` is `None` unless the caller supplied source
/// embeddings for a direct cosine comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CitationPairScore {
    /// Lexical keyword overlap between the claim sentence and the source.
    pub lexical_overlap: f64,
    /// N-gram (bigram/trigram) overlap, trigrams weighted higher.
    pub ngram_overlap: f64,
    /// Fraction of capitalized tokens (a crude entity proxy) in the claim
    /// also present in the source.
    pub entity_alignment: f64,
    /// Optional cosine similarity against the source chunk's embedding.
    pub semantic_cosine: Option<f64>,
    /// The weighted combination of the above.
    pub score: f64,
}

fn ngrams(tokens: &[&str], n: usize) -> std::collections::HashSet<String> {
    tokens.windows(n).map(|w| w.join(" ")).collect()
}

fn ngram_overlap(claim: &str, source: &str) -> f64 {
    let claim_tokens: Vec<&str> = claim.split_whitespace().collect();
    let source_tokens: Vec<&str> = source.split_whitespace().collect();
    if claim_tokens.len() < 2 || source_tokens.len() < 2 {
        return 0.0;
    }
    let bigram_score = min_based_overlap(&ngrams(&claim_tokens, 2), &ngrams(&source_tokens, 2));
    let trigram_score = if claim_tokens.len() >= 3 && source_tokens.len() >= 3 {
        min_based_overlap(&ngrams(&claim_tokens, 3), &ngrams(&source_tokens, 3))
    } else {
        0.0
    };
    0.4 * bigram_score + 0.6 * trigram_score
}

fn entity_alignment(claim: &str, source: &str) -> f64 {
    let capitalized: Vec<&str> = claim
        .split_whitespace()
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .collect();
    if capitalized.is_empty() {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let matched = capitalized.iter().filter(|w| source.contains(*w)).count() as f64;
    #[allow(clippy::cast_precision_loss)]
    {
        matched / capitalized.len() as f64
    }
}

/// Scores one claim sentence against its cited source text.
/// `semantic_cosine`, when supplied, blends in at weight 0.40 and the
/// other three weights scale down proportionally to still sum to 1.0.
#[must_use]
pub fn score_citation_pair(claim: &str, source: &str, semantic_cosine: Option<f64>) -> CitationPairScore {
    let lexical = min_based_overlap(&keyword_set(claim), &keyword_set(source));
    let ngram = ngram_overlap(claim, source);
    let entity = entity_alignment(claim, source);

    let score = match semantic_cosine {
        Some(cosine) => 0.25 * lexical + 0.20 * ngram + 0.15 * entity + 0.40 * cosine,
        None => {
            let total_weight = 0.25 + 0.20 + 0.15;
            (0.25 * lexical + 0.20 * ngram + 0.15 * entity) / total_weight
        }
    };

    CitationPairScore {
        lexical_overlap: lexical,
        ngram_overlap: ngram,
        entity_alignment: entity,
        semantic_cosine,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_citations_forces_legacy_none() {
        let config = PipelineConfig::default();
        let outcome = score("Postgres scales well.", &[], &[0.9], Intent::Question, &config);
        assert_eq!(outcome.legacy, ConfidenceLevel::None);
    }

    #[test]
    fn uncertainty_acknowledgement_forces_legacy_none() {
        let config = PipelineConfig::default();
        let outcome = score(
            "I don't have any notes about that topic [1].",
            &[1],
            &[0.9],
            Intent::Question,
            &config,
        );
        assert_eq!(outcome.legacy, ConfidenceLevel::None);
    }

    #[test]
    fn well_cited_coherent_answer_scores_high() {
        let config = PipelineConfig::default();
        let text = "We chose Postgres for scale and durability in 2023 [1]. It replaced the prior MySQL setup entirely [2].";
        let outcome = score(text, &[1, 2], &[0.9, 0.85], Intent::Question, &config);
        assert!(outcome.breakdown.composite > 0.5);
    }

    #[test]
    fn marker_cluster_and_missing_terminal_punctuation_penalize_coherence() {
        let text = "The answer is here [1][2][3][4]";
        let coherence = answer_coherence(text, Intent::Question);
        assert!(coherence < 0.7);
    }

    #[test]
    fn list_intent_without_list_markup_is_penalized() {
        let with_markup = "- first point [1]\n- second point [2]";
        let without_markup = "First point and second point in one long sentence without any list markup at all [1].";
        assert!(answer_coherence(with_markup, Intent::List) > answer_coherence(without_markup, Intent::List));
    }

    #[test]
    fn citation_density_peaks_at_seventy_percent() {
        let half = vec!["Sentence one with enough length to count [1].", "Sentence two with enough length to count."];
        let all = vec!["Sentence one with enough length to count [1].", "Sentence two with enough length to count [2]."];
        let density_half = citation_density(&half);
        let density_all = citation_density(&all);
        assert!(density_half > 0.0);
        assert!(density_all < 1.0);
    }

    #[test]
    fn per_citation_scorer_rewards_shared_vocabulary() {
        let strong = score_citation_pair("we migrated the database to postgres", "the team migrated the database to postgres for scale", None);
        let weak = score_citation_pair("the weather was nice today", "the team migrated the database to postgres for scale", None);
        assert!(strong.score > weak.score);
    }

    #[test]
    fn semantic_cosine_blends_into_citation_pair_score() {
        let without = score_citation_pair("unrelated text entirely", "some other source text", None);
        let with_high_cosine = score_citation_pair("unrelated text entirely", "some other source text", Some(0.95));
        assert!(with_high_cosine.score > without.score);
    }
}
