//! Query Analyzer: classifies intent, extracts keywords and time hints,
//! and computes the adaptive candidate count for a single query.
//!
//! Deterministic for equal inputs; never fails. If classification yields
//! nothing useful it falls back to [`Intent::Search`] with keywords equal
//! to every non-stop-word token of length >= 3 — see
//! [`QueryAnalysis::fallback`].

pub mod stop_words;
pub mod time_hint;
pub mod tokenize;

use crate::config::PipelineConfig;
use crate::core::{Intent, QueryAnalysis};

/// Classifies `raw_query`'s intent from leading phrases and word stems.
#[must_use]
pub fn classify_intent(raw_query: &str) -> Intent {
    let lowered = raw_query.trim().to_lowercase();

    if lowered.starts_with("summarize") || lowered.starts_with("summarise") {
        return Intent::Summarize;
    }
    if lowered.starts_with("list ")
        || lowered.starts_with("show me")
        || lowered.starts_with("show all")
    {
        return Intent::List;
    }
    if lowered.contains("what did we decide")
        || lowered.contains("what was decided")
        || lowered.contains("decision")
    {
        return Intent::Decision;
    }
    if lowered.contains("todo")
        || lowered.contains("action item")
        || lowered.contains("what do i need to do")
        || lowered.contains("what should i do")
    {
        return Intent::ActionItem;
    }
    if is_direct_interrogative(&lowered) {
        return Intent::Question;
    }
    Intent::Search
}

const INTERROGATIVE_LEADS: &[&str] = &[
    "who", "what", "when", "where", "why", "how", "is", "are", "do", "does", "did", "can",
    "could", "will", "would", "should",
];

fn is_direct_interrogative(lowered: &str) -> bool {
    let starts_with_lead = INTERROGATIVE_LEADS
        .iter()
        .any(|lead| lowered.starts_with(lead) && lowered[lead.len()..].starts_with(' '));
    starts_with_lead || lowered.trim_end().ends_with('?')
}

/// Computes the adaptive candidate count for a query, given its intent and
/// keyword count.
#[must_use]
pub fn adaptive_candidate_count(intent: Intent, keyword_count: usize, config: &PipelineConfig) -> usize {
    let mut k = config.candidate_k_base;
    if matches!(intent, Intent::List | Intent::Summarize) {
        k += config.candidate_k_base / 2;
    }
    if keyword_count > 6 {
        k += keyword_count - 6;
    }
    k.min(config.candidate_k_cap)
}

/// Analyzes a single query. Never fails: classification that matches no
/// rule already defaults to [`Intent::Search`], and keyword extraction
/// already keeps every non-stop-word token of length >= 3 — together
/// these are the fallback the component design calls for when analysis
/// "yields nothing useful".
#[must_use]
pub fn analyze(raw_query: &str, config: &PipelineConfig) -> QueryAnalysis {
    let keywords = tokenize::extract_keywords(raw_query);
    let intent = classify_intent(raw_query);
    let time_hint = time_hint::extract_time_hint(raw_query);
    let candidate_count = adaptive_candidate_count(intent, keywords.len(), config);

    QueryAnalysis {
        raw_query: raw_query.to_string(),
        intent,
        keywords,
        time_hint,
        candidate_count,
    }
}
