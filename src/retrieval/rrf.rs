//! Reciprocal Rank Fusion over the three retrieval sources.
//!
//! Based on Cormack, Clarke, Buettcher (2009), "Reciprocal Rank Fusion
//! outperforms Condorcet and individual Rank Learning Methods". Fuses
//! vector, lexical, and recency rankings into one score per chunk, then
//! applies the multi-source boost.

use std::cmp::Ordering;
use std::collections::HashMap;

/// RRF tuning: the `k` constant and each source's weight.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    /// Controls how much weight lower-ranked items retain; higher `k`
    /// flattens the score curve. The paper's recommended default is 60.
    pub k: u32,
    /// Fractional score boost applied per additional contributing source
    /// beyond the first.
    pub multi_source_boost_per_extra: f64,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            k: 60,
            multi_source_boost_per_extra: 0.15,
        }
    }
}

/// The result of fusing one chunk's rankings across sources.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    /// Chunk identifier.
    pub chunk_id: String,
    /// RRF score after the multi-source boost.
    pub score: f64,
    /// Number of sources that ranked this chunk at all.
    pub source_count: u8,
}

/// Fuses `ranked_lists` — each a `(source_name, weight, ranking)` triple,
/// where `ranking` is chunk identifiers ordered best-first — into a single
/// list of [`FusedScore`], sorted by score descending. Ties are broken by
/// chunk identifier for a fully deterministic order; callers that need
/// "strongest component score" tie-breaking re-sort using their own
/// component-score map, since this function only sees ranks.
#[must_use]
pub fn weighted_rrf(ranked_lists: &[(&[String], f64)], config: &RrfConfig) -> Vec<FusedScore> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut source_counts: HashMap<String, u8> = HashMap::new();

    for (list, weight) in ranked_lists {
        for (rank, chunk_id) in list.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let rrf_term = weight / f64::from(config.k + rank as u32 + 1);
            *scores.entry(chunk_id.clone()).or_insert(0.0) += rrf_term;
            *source_counts.entry(chunk_id.clone()).or_insert(0) += 1;
        }
    }

    let mut results: Vec<FusedScore> = scores
        .into_iter()
        .map(|(chunk_id, base_score)| {
            let source_count = source_counts.get(&chunk_id).copied().unwrap_or(1);
            let boost = 1.0
                + config.multi_source_boost_per_extra * f64::from(source_count.saturating_sub(1));
            FusedScore {
                chunk_id,
                score: base_score * boost,
                source_count,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn single_source_orders_by_rank() {
        let list = ids(&["a", "b", "c"]);
        let config = RrfConfig::default();
        let results = weighted_rrf(&[(&list, 1.0)], &config);
        assert_eq!(results[0].chunk_id, "a");
        assert!(results[0].score > results[1].score);
        assert!(results[1].score > results[2].score);
    }

    #[test]
    fn multi_source_hit_gets_boosted() {
        let vector = ids(&["a", "b"]);
        let lexical = ids(&["a", "c"]);
        let config = RrfConfig::default();
        let results = weighted_rrf(&[(&vector, 1.0), (&lexical, 0.8)], &config);
        let a = results.iter().find(|r| r.chunk_id == "a").unwrap();
        assert_eq!(a.source_count, 2);
        assert!(a.score > results.iter().find(|r| r.chunk_id == "b").unwrap().score);
    }

    #[test]
    fn source_weight_affects_ranking() {
        let vector = ids(&["a", "b"]);
        let lexical = ids(&["b", "a"]);
        let config = RrfConfig::default();
        let results = weighted_rrf(
            &[(&vector, 1.0), (&lexical, 0.3)],
            &config,
        );
        assert_eq!(results[0].chunk_id, "a");
    }

    #[test]
    fn empty_lists_yield_empty_result() {
        let empty: Vec<String> = Vec::new();
        let config = RrfConfig::default();
        let results = weighted_rrf(&[(&empty, 1.0)], &config);
        assert!(results.is_empty());
    }

    #[test]
    fn ties_break_by_chunk_id() {
        let list = ids(&["z", "a"]);
        let config = RrfConfig::default();
        // both at distinct ranks so no real tie, but verify determinism
        let r1 = weighted_rrf(&[(&list, 1.0)], &config);
        let r2 = weighted_rrf(&[(&list, 1.0)], &config);
        assert_eq!(r1, r2);
    }
}
