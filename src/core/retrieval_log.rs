//! Per-request retrieval diagnostics handed to the observability sink.

use serde::{Deserialize, Serialize};

/// Which retrieval sources actually contributed to a request's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Only vector search ran (lexical and recency yielded nothing or were
    /// unavailable).
    Vector,
    /// Two or more sources contributed and were fused.
    Hybrid,
    /// Only lexical search ran.
    KeywordOnly,
    /// Vector and lexical both failed or were unavailable; recency alone,
    /// or no sources, produced the result.
    Fallback,
}

/// Summary statistics over the fused relevance scores of one request's
/// retrieved chunks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    /// Minimum fused score among retrieved chunks.
    pub min: f64,
    /// Maximum fused score among retrieved chunks.
    pub max: f64,
    /// Mean fused score among retrieved chunks.
    pub mean: f64,
    /// Number of chunks the distribution was computed over.
    pub count: usize,
}

impl ScoreDistribution {
    /// Computes a distribution over a slice of fused scores.
    ///
    /// Returns all-zero with `count = 0` for an empty slice.
    #[must_use]
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                count: 0,
            };
        }
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        Self {
            min,
            max,
            mean,
            count: scores.len(),
        }
    }
}

/// Wall-clock time spent in each pipeline stage, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    /// Time spent analyzing the query.
    pub analyze_ms: u64,
    /// Time spent in retrieval (the slowest of the parallel sub-searches,
    /// not their sum).
    pub retrieve_ms: u64,
    /// Time spent reranking, `0` if reranking did not run.
    pub rerank_ms: u64,
    /// Time spent building the sources pack.
    pub pack_ms: u64,
    /// Time spent building the prompt.
    pub prompt_ms: u64,
    /// Time spent in the generator, including any repair call.
    pub generate_ms: u64,
    /// Time spent validating citations.
    pub validate_ms: u64,
    /// Time spent post-processing the answer text.
    pub postprocess_ms: u64,
    /// Time spent scoring confidence.
    pub confidence_ms: u64,
}

impl StageTimings {
    /// Total time across all recorded stages.
    #[must_use]
    pub const fn total_ms(&self) -> u64 {
        self.analyze_ms
            + self.retrieve_ms
            + self.rerank_ms
            + self.pack_ms
            + self.prompt_ms
            + self.generate_ms
            + self.validate_ms
            + self.postprocess_ms
            + self.confidence_ms
    }
}

/// Pass/fail and quality flags surfaced alongside the raw counts, for
/// quick dashboard filtering without recomputing them from the rest of
/// the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityFlags {
    /// Citation coverage as a percentage (`0..=100`).
    pub coverage_percent: u8,
    /// Number of dangling markers the validator stripped.
    pub dangling_removed: usize,
    /// Number of valid-but-low-overlap markers the validator dropped.
    pub invalids_removed: usize,
    /// Whether the repair pass ran.
    pub regeneration_attempted: bool,
    /// Whether a deterministic fallback answer was returned instead of a
    /// generated one.
    pub fallback_used: bool,
    /// Heuristic count of answer segments flagged as possibly
    /// unsupported by any cited source.
    pub hallucinations_detected: usize,
}

/// A structured record of how one request's retrieval and validation went,
/// emitted to the observability sink after the request completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalLog {
    /// Caller-supplied or generated request identifier.
    pub request_id: String,
    /// Identifier correlating this request across downstream services.
    pub trace_id: String,
    /// Tenant the request was scoped to.
    pub tenant_id: String,
    /// The query text, truncated to 500 characters.
    pub query: String,
    /// Full (untruncated) character length of the original query.
    pub query_length: usize,
    /// The detected query intent, as its serialized label.
    pub intent: String,
    /// Which sources contributed.
    pub mode: RetrievalMode,
    /// Number of candidates returned by each source before fusion:
    /// `(vector, lexical, recency)`.
    pub candidate_counts: (usize, usize, usize),
    /// Number of candidates remaining after fusion, before rerank.
    pub merged_count: usize,
    /// Number of candidates remaining after rerank (or `merged_count` if
    /// rerank did not run).
    pub after_rerank_count: usize,
    /// Number of chunks retained after fusion and budget cutoff.
    pub retained_count: usize,
    /// Distribution of fused scores over retained chunks.
    pub score_distribution: ScoreDistribution,
    /// Score-distribution gap between the top and second-ranked chunk.
    pub score_gap_top_two: f64,
    /// Number of distinct notes represented among retained chunks.
    pub unique_note_count: usize,
    /// Whether the citation repair pass ran.
    pub repair_attempted: bool,
    /// Whether the repair pass's output was accepted.
    pub repair_accepted: bool,
    /// Number of dangling citation markers stripped from the raw answer.
    pub dangling_citations_stripped: usize,
    /// `(marker, note_id prefix, score)` for each surviving citation.
    pub citation_summaries: Vec<(u32, String, f64)>,
    /// Quality/status flags for dashboard filtering.
    pub quality: QualityFlags,
    /// Length of the final answer text, in characters.
    pub answer_length: usize,
    /// Per-stage timings.
    pub timings: StageTimings,
    /// ISO-8601 timestamp supplied by the caller at record-build time
    /// (the core has no wall-clock access of its own).
    pub timestamp: String,
}
