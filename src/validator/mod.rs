//! Citation Validator: the same algorithm runs as a pre-pipeline pass on
//! the raw answer and as the post-repair pass on a regenerated one.
//!
//! Parses `[N<int>]` markers, drops the ones that don't map to a Sources
//! Pack entry, scores the surviving ones against their source text, then
//! collapses duplicates and enforces a per-sentence cap. Never invents or
//! reorders citations — only ever removes them.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::PipelineConfig;
use crate::core::{ScoredChunk, SourcesPack};
use crate::textutil::overlap::text_overlap;
use crate::textutil::sentence::{is_substantial, split_sentences};

#[allow(clippy::unwrap_used)]
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[N(\d+)\]").unwrap());
#[allow(clippy::unwrap_used)]
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
#[allow(clippy::unwrap_used)]
static SPACE_BEFORE_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +([.,!?;:])").unwrap());
#[allow(clippy::unwrap_used)]
static BLANK_LINE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
#[allow(clippy::unwrap_used)]
static EMPTY_BRACKETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\]").unwrap());

/// How a valid marker's overlap against its source text was judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapVerdict {
    /// Overlap met the acceptance threshold.
    Accepted,
    /// Overlap was between half the threshold and the threshold: kept,
    /// but flagged for observability.
    Suspicious,
    /// Overlap was below half the threshold: the marker was removed.
    Dropped,
}

/// Result of one validation pass.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// The answer text after dangling/dropped/duplicate markers are
    /// removed and the per-sentence cap is enforced. Still carries
    /// internal `[N<int>]` markers; renumbering is the post-processor's
    /// job.
    pub text: String,
    /// Marker numbers that survive in `text`, in first-appearance order.
    pub valid_markers: Vec<u32>,
    /// Marker numbers parsed from the original answer that did not map
    /// to a Sources Pack entry.
    pub dangling_markers: Vec<u32>,
    /// Marker numbers that were valid but dropped for insufficient
    /// overlap with their source.
    pub dropped_markers: Vec<u32>,
    /// Marker numbers kept despite overlap in the suspicious range.
    pub suspicious_markers: Vec<u32>,
    /// Overlap score computed for every valid marker (dropped ones
    /// included), keyed by marker number.
    pub overlap_scores: HashMap<u32, f64>,
    /// Fraction of `>15`-character sentences in `text` carrying at least
    /// one surviving marker.
    pub citation_coverage: f64,
    /// `true` iff no dangling markers were found.
    pub contract_compliant: bool,
}

fn source_text_for(marker: u32, pack: &SourcesPack, scored_chunks: Option<&[ScoredChunk]>) -> Option<String> {
    let citation = pack.get(marker)?;
    if let Some(chunks) = scored_chunks
        && let Some(sc) = chunks.iter().find(|sc| sc.chunk.id == citation.chunk_id)
    {
        return Some(sc.chunk.text.clone());
    }
    Some(citation.snippet.clone())
}

fn normalize_text(text: &str) -> String {
    let collapsed = MULTI_SPACE.replace_all(text, " ");
    let punctuated = SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1");
    let no_empty_brackets = EMPTY_BRACKETS.replace_all(&punctuated, "");
    BLANK_LINE_RUN.replace_all(&no_empty_brackets, "\n\n").into_owned()
}

fn remove_markers(text: &str, should_remove: impl Fn(u32) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0usize;
    for caps in MARKER_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let num: u32 = caps
            .get(1)
            .and_then(|g| g.as_str().parse().ok())
            .unwrap_or(0);
        out.push_str(&text[last_end..whole.start()]);
        if !should_remove(num) {
            out.push_str(whole.as_str());
        }
        last_end = whole.end();
    }
    out.push_str(&text[last_end..]);
    normalize_text(&out)
}

fn collapse_adjacent_duplicates(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0usize;
    let mut prev_marker: Option<u32> = None;
    for caps in MARKER_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let num: u32 = caps
            .get(1)
            .and_then(|g| g.as_str().parse().ok())
            .unwrap_or(0);
        let gap = &text[last_end..whole.start()];
        let is_duplicate = prev_marker == Some(num) && gap.trim().is_empty();
        out.push_str(gap);
        if is_duplicate {
            last_end = whole.end();
            continue;
        }
        out.push_str(whole.as_str());
        prev_marker = Some(num);
        last_end = whole.end();
    }
    out.push_str(&text[last_end..]);
    out
}

fn cap_markers_per_sentence(text: &str, cap: usize) -> String {
    let base = text.as_ptr() as usize;
    let mut remove_spans: Vec<(usize, usize)> = Vec::new();

    for sentence in split_sentences(text) {
        let start = (sentence.as_ptr() as usize).saturating_sub(base);
        let end = start + sentence.len();
        let marks: Vec<(usize, usize)> = MARKER_RE
            .find_iter(&text[start..end])
            .map(|m| (start + m.start(), start + m.end()))
            .collect();
        if marks.len() > cap {
            remove_spans.extend(marks.into_iter().skip(cap));
        }
    }

    if remove_spans.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut last_end = 0usize;
    for (start, end) in remove_spans {
        out.push_str(&text[last_end..start]);
        last_end = end;
    }
    out.push_str(&text[last_end..]);
    out
}

fn first_appearance_order(text: &str) -> Vec<u32> {
    let mut seen = Vec::new();
    for caps in MARKER_RE.captures_iter(text) {
        if let Some(num) = caps.get(1).and_then(|g| g.as_str().parse().ok()) {
            if !seen.contains(&num) {
                seen.push(num);
            }
        }
    }
    seen
}

fn compute_coverage(text: &str) -> f64 {
    let sentences = split_sentences(text);
    let substantial: Vec<&&str> = sentences.iter().filter(|s| is_substantial(s)).collect();
    if substantial.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let cited = substantial
        .iter()
        .filter(|s| MARKER_RE.is_match(s))
        .count() as f64;
    #[allow(clippy::cast_precision_loss)]
    {
        cited / substantial.len() as f64
    }
}

/// Runs the validator on `answer_text`, using `pack` to resolve which
/// markers are valid and `scored_chunks` (if supplied) for full-text
/// overlap instead of the packed snippet.
#[must_use]
pub fn validate(
    answer_text: &str,
    pack: &SourcesPack,
    scored_chunks: Option<&[ScoredChunk]>,
    config: &PipelineConfig,
) -> ValidationOutcome {
    let parsed = first_appearance_order(answer_text);
    let (valid, dangling): (Vec<u32>, Vec<u32>) =
        parsed.into_iter().partition(|m| pack.get(*m).is_some());

    let after_dangling_strip = remove_markers(answer_text, |num| !valid.contains(&num));

    let markers_only = MARKER_RE.replace_all(&after_dangling_strip, "");
    let answer_keywords_text = markers_only.into_owned();

    let mut overlap_scores = HashMap::new();
    let mut dropped = Vec::new();
    let mut suspicious = Vec::new();
    for &marker in &valid {
        let Some(source_text) = source_text_for(marker, pack, scored_chunks) else {
            continue;
        };
        let overlap = text_overlap(&answer_keywords_text, &source_text);
        overlap_scores.insert(marker, overlap);
        if overlap < config.overlap_accept_threshold * config.overlap_suspicious_ratio {
            dropped.push(marker);
        } else if overlap < config.overlap_accept_threshold {
            suspicious.push(marker);
        }
    }

    let after_overlap_drop = remove_markers(&after_dangling_strip, |num| dropped.contains(&num));
    let deduped = collapse_adjacent_duplicates(&after_overlap_drop);
    let capped = cap_markers_per_sentence(&deduped, config.markers_per_sentence_cap);
    let final_text = normalize_text(&capped);

    let valid_markers = first_appearance_order(&final_text);
    let citation_coverage = compute_coverage(&final_text);

    ValidationOutcome {
        text: final_text,
        valid_markers,
        dangling_markers: dangling.clone(),
        dropped_markers: dropped,
        suspicious_markers: suspicious,
        overlap_scores,
        citation_coverage,
        contract_compliant: dangling.is_empty(),
    }
}

/// Whether a repair pass should be attempted, per the pre-repair outcome
/// and how many sources were offered.
#[must_use]
pub fn should_repair(outcome: &ValidationOutcome, sources_offered: usize, config: &PipelineConfig) -> bool {
    outcome.valid_markers.is_empty()
        || (outcome.citation_coverage < config.repair_coverage_threshold
            && sources_offered >= config.min_sources_for_repair)
        || !outcome.dropped_markers.is_empty()
        || !outcome.dangling_markers.is_empty()
}

/// Decides whether a repaired answer's validation outcome should replace
/// the pre-repair one: only if its coverage is strictly greater and at
/// least one valid citation survives.
#[must_use]
pub fn accept_repair(pre_repair: &ValidationOutcome, repaired: &ValidationOutcome) -> bool {
    repaired.citation_coverage > pre_repair.citation_coverage && !repaired.valid_markers.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Citation;

    fn pack_with(n: u32) -> SourcesPack {
        let citations = (1..=n)
            .map(|i| Citation {
                marker: i,
                chunk_id: format!("c{i}"),
                note_id: format!("n{i}"),
                title: None,
                snippet: "we chose postgres for storage because it scales well".to_string(),
                anchor: None,
                offsets: None,
                score: 0.8,
            })
            .collect();
        SourcesPack {
            citations,
            truncated_count: 0,
        }
    }

    #[test]
    fn dangling_marker_is_stripped_and_flagged_noncompliant() {
        let pack = pack_with(1);
        let config = PipelineConfig::default();
        let outcome = validate("We use Postgres [N1]. It was chosen for scale [N9].", &pack, None, &config);
        assert_eq!(outcome.dangling_markers, vec![9]);
        assert!(!outcome.text.contains("N9"));
        assert!(!outcome.contract_compliant);
    }

    #[test]
    fn adjacent_duplicate_markers_collapse() {
        let pack = pack_with(1);
        let config = PipelineConfig::default();
        let outcome = validate("We chose postgres for storage [N1][N1] because it scales well.", &pack, None, &config);
        assert_eq!(outcome.text.matches("[N1]").count(), 1);
    }

    #[test]
    fn low_overlap_marker_is_dropped() {
        let pack = pack_with(1);
        let config = PipelineConfig::default();
        let outcome = validate("Completely unrelated sentence about weather forecasts today [N1].", &pack, None, &config);
        assert!(outcome.dropped_markers.contains(&1));
        assert!(!outcome.text.contains("N1"));
    }

    #[test]
    fn markers_per_sentence_cap_trims_excess() {
        let pack = pack_with(5);
        let config = PipelineConfig::builder().build();
        let text = "We chose postgres for storage [N1][N2][N3][N4][N5] because it scales well.";
        let outcome = validate(text, &pack, None, &config);
        let cap = config.markers_per_sentence_cap;
        assert_eq!(outcome.text.matches("[N").count(), cap);
    }

    #[test]
    fn coverage_counts_only_substantial_sentences_with_markers() {
        let pack = pack_with(1);
        let config = PipelineConfig::default();
        let outcome = validate(
            "We chose postgres for storage because it scales well [N1]. Ok.",
            &pack,
            None,
            &config,
        );
        assert!((outcome.citation_coverage - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_repair_triggers_on_zero_valid_citations() {
        let pack = pack_with(1);
        let config = PipelineConfig::default();
        let outcome = validate("No citations here at all.", &pack, None, &config);
        assert!(should_repair(&outcome, 1, &config));
    }

    #[test]
    fn accept_repair_requires_strictly_greater_coverage() {
        let pre = ValidationOutcome {
            text: String::new(),
            valid_markers: vec![1],
            dangling_markers: vec![],
            dropped_markers: vec![],
            suspicious_markers: vec![],
            overlap_scores: HashMap::new(),
            citation_coverage: 0.4,
            contract_compliant: true,
        };
        let mut worse = pre.clone();
        worse.citation_coverage = 0.4;
        assert!(!accept_repair(&pre, &worse));

        let mut better = pre.clone();
        better.citation_coverage = 0.6;
        assert!(accept_repair(&pre, &better));

        let mut empty = pre.clone();
        empty.citation_coverage = 0.9;
        empty.valid_markers = vec![];
        assert!(!accept_repair(&pre, &empty));
    }
}
