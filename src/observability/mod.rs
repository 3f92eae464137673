//! Observability: structured per-request logging and heuristic quality
//! flags.
//!
//! [`init_tracing`] wires up `tracing-subscriber` the same way across the
//! demo binary and tests; [`build_record`] assembles the one structured
//! [`RetrievalLog`] emitted per request; [`emit_warnings`] fires the
//! warn-level `tracing` events the component design calls out explicitly.
//! Heuristic hallucination flagging never removes anything — it is purely
//! a signal surfaced alongside the record.

use std::sync::LazyLock;

use regex::Regex;
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;
use crate::core::{Intent, QualityFlags, RetrievalLog, RetrievalMode, ScoreDistribution, ScoredChunk, StageTimings};
use crate::textutil::sentence::split_sentences;

#[allow(clippy::unwrap_used)]
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());
#[allow(clippy::unwrap_used)]
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d[\d,.]*\b").unwrap());
#[allow(clippy::unwrap_used)]
static ABSOLUTE_CLAIM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(always|never|every|all|none|definitely|certainly)\b").unwrap());

const FABRICATION_PHRASES: &[&str] = &[
    "your notes indicate",
    "your notes suggest",
    "as your notes show",
    "the notes clearly state",
];
const LONG_ASSERTION_CHARS: usize = 120;

/// Initializes the global `tracing` subscriber from `RUST_LOG` (or the
/// crate's default if unset). Idempotent: a second call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn marker_nearby(text: &str, at: usize, window: usize) -> bool {
    let start = at.saturating_sub(window);
    let end = (at + window).min(text.len());
    MARKER_RE.is_match(&text[start..end])
}

/// Counts answer segments that look like fabricated or uncited claims:
/// known fabrication phrasing with no citation nearby, bare numbers with
/// no nearby citation, and long sentences asserting an absolute claim
/// with no citation at all.
#[must_use]
pub fn detect_hallucination_flags(text: &str) -> usize {
    let lowered = text.to_lowercase();
    let mut count = 0usize;

    for phrase in FABRICATION_PHRASES {
        let mut search_from = 0usize;
        while let Some(rel) = lowered[search_from..].find(phrase) {
            let at = search_from + rel;
            if !marker_nearby(text, at, 60) {
                count += 1;
            }
            search_from = at + phrase.len();
        }
    }

    for m in NUMBER_RE.find_iter(text) {
        if !marker_nearby(text, m.start(), 40) {
            count += 1;
        }
    }

    for sentence in split_sentences(text) {
        if sentence.chars().count() > LONG_ASSERTION_CHARS
            && ABSOLUTE_CLAIM_RE.is_match(sentence)
            && !MARKER_RE.is_match(sentence)
        {
            count += 1;
        }
    }

    count
}

fn unique_note_count(chunks: &[ScoredChunk]) -> usize {
    let mut notes: Vec<&str> = chunks.iter().map(|sc| sc.chunk.note_id.as_str()).collect();
    notes.sort_unstable();
    notes.dedup();
    notes.len()
}

fn score_gap_top_two(chunks: &[ScoredChunk]) -> f64 {
    let mut scores: Vec<f64> = chunks.iter().map(|sc| sc.score).collect();
    scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    match (scores.first(), scores.get(1)) {
        (Some(top), Some(second)) => (top - second).max(0.0),
        _ => 0.0,
    }
}

/// Everything [`build_record`] needs beyond what's already in
/// [`RetrievalLog`]'s shape, gathered as one argument to keep the call
/// site manageable.
pub struct RecordInputs<'a> {
    /// Caller-supplied or generated request identifier.
    pub request_id: String,
    /// Identifier correlating this request across downstream services.
    pub trace_id: String,
    /// Tenant the request was scoped to.
    pub tenant_id: String,
    /// The raw query text.
    pub query: &'a str,
    /// The detected intent.
    pub intent: Intent,
    /// Which sources contributed.
    pub mode: RetrievalMode,
    /// `(vector, lexical, recency)` candidate counts before fusion.
    pub candidate_counts: (usize, usize, usize),
    /// Candidate count after fusion, before rerank.
    pub merged_count: usize,
    /// Candidate count after rerank (or equal to `merged_count` if
    /// rerank did not run).
    pub after_rerank_count: usize,
    /// The final retained, scored chunks.
    pub retained: &'a [ScoredChunk],
    /// `(marker, note_id, score)` for each surviving citation.
    pub citation_summaries: Vec<(u32, String, f64)>,
    /// Whether the repair pass ran.
    pub repair_attempted: bool,
    /// Whether the repair pass's output was accepted.
    pub repair_accepted: bool,
    /// Number of dangling markers stripped.
    pub dangling_removed: usize,
    /// Number of valid-but-low-overlap markers dropped.
    pub invalids_removed: usize,
    /// Citation coverage in `[0, 1]`.
    pub citation_coverage: f64,
    /// Whether a deterministic fallback answer was returned.
    pub fallback_used: bool,
    /// The final answer text (used for length and hallucination flagging).
    pub answer_text: &'a str,
    /// Per-stage timings.
    pub timings: StageTimings,
    /// ISO-8601 timestamp, supplied by the caller.
    pub timestamp: String,
}

const QUERY_TRUNCATE_CHARS: usize = 500;

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Assembles the one structured [`RetrievalLog`] emitted per request.
#[must_use]
pub fn build_record(inputs: RecordInputs<'_>) -> RetrievalLog {
    let scores: Vec<f64> = inputs.retained.iter().map(|sc| sc.score).collect();
    #[allow(clippy::cast_possible_truncation)]
    let coverage_percent = (inputs.citation_coverage * 100.0).round() as u8;

    RetrievalLog {
        request_id: inputs.request_id,
        trace_id: inputs.trace_id,
        tenant_id: inputs.tenant_id,
        query: truncate_chars(inputs.query, QUERY_TRUNCATE_CHARS),
        query_length: inputs.query.chars().count(),
        intent: format!("{:?}", inputs.intent).to_lowercase(),
        mode: inputs.mode,
        candidate_counts: inputs.candidate_counts,
        merged_count: inputs.merged_count,
        after_rerank_count: inputs.after_rerank_count,
        retained_count: inputs.retained.len(),
        score_distribution: ScoreDistribution::from_scores(&scores),
        score_gap_top_two: score_gap_top_two(inputs.retained),
        unique_note_count: unique_note_count(inputs.retained),
        repair_attempted: inputs.repair_attempted,
        repair_accepted: inputs.repair_accepted,
        dangling_citations_stripped: inputs.dangling_removed,
        citation_summaries: inputs.citation_summaries,
        quality: QualityFlags {
            coverage_percent,
            dangling_removed: inputs.dangling_removed,
            invalids_removed: inputs.invalids_removed,
            regeneration_attempted: inputs.repair_attempted,
            fallback_used: inputs.fallback_used,
            hallucinations_detected: detect_hallucination_flags(inputs.answer_text),
        },
        answer_length: inputs.answer_text.chars().count(),
        timings: inputs.timings,
        timestamp: inputs.timestamp,
    }
}

/// Fires the warn-level `tracing` events the component design calls out:
/// low coverage with enough sources and a non-uncertainty answer, single-
/// source score dominance, and any dropped citations.
pub fn emit_warnings(log: &RetrievalLog, is_uncertainty_answer: bool, config: &PipelineConfig) {
    #[allow(clippy::cast_precision_loss)]
    let coverage_fraction = f64::from(log.quality.coverage_percent) / 100.0;
    let sources_offered = log.retained_count;

    if coverage_fraction < config.coverage_warn_threshold
        && sources_offered >= config.min_sources_for_repair
        && !is_uncertainty_answer
    {
        tracing::warn!(
            request_id = %log.request_id,
            coverage_percent = log.quality.coverage_percent,
            "citation coverage below strict threshold"
        );
    }

    if log.score_gap_top_two > config.score_gap_warn_threshold {
        tracing::warn!(
            request_id = %log.request_id,
            gap = log.score_gap_top_two,
            "single-source score dominance"
        );
    }

    if log.quality.invalids_removed > 0 {
        tracing::warn!(
            request_id = %log.request_id,
            dropped = log.quality.invalids_removed,
            "citations dropped for insufficient overlap"
        );
    }
}
