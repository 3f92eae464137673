//! Optional cross-encoder rerank stage.
//!
//! Unlike the six collaborator traits in [`crate::collaborators`] (always
//! required integrations), the cross-encoder is an optional seventh
//! external call: retrieval runs fine without one configured. On timeout,
//! parse failure, or backend error it is a local recovery — the original
//! RRF order is kept unchanged, never surfaced as a pipeline error.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

/// The query's detected surface shape, passed to the cross-encoder as a
/// scoring-guidance parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Asks for a specific fact ("what database did we choose").
    Factual,
    /// Asks how to do something ("how do I deploy this").
    Procedural,
    /// Anchored to a time window ("what did I write last week").
    Temporal,
    /// Open-ended, no single expected answer shape.
    Exploratory,
}

/// Detects [`QueryType`] from the query's surface form. Temporal wins over
/// factual/procedural when a time hint is present, since the scoring
/// guidance benefits most from knowing recency matters.
#[must_use]
pub fn detect_query_type(raw_query: &str, has_time_hint: bool) -> QueryType {
    let lowered = raw_query.to_lowercase();
    if has_time_hint {
        return QueryType::Temporal;
    }
    if lowered.starts_with("how ") || lowered.contains("how do i") || lowered.contains("how to") {
        return QueryType::Procedural;
    }
    if lowered.starts_with("what")
        || lowered.starts_with("who")
        || lowered.starts_with("when")
        || lowered.starts_with("where")
    {
        return QueryType::Factual;
    }
    QueryType::Exploratory
}

/// A pairwise relevance scorer: given a query and a batch of candidate
/// `(chunk_id, chunk_text)` pairs, returns a relevance score per candidate
/// in the same order.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Scores `candidates` against `query`. Scores need not be normalized;
    /// the caller only uses their relative order and a linear blend.
    async fn score(
        &self,
        query: &str,
        query_type: QueryType,
        candidates: &[(String, String)],
    ) -> Result<Vec<f64>, String>;
}

/// Runs `encoder` over `candidates` with a hard timeout. Returns `None`
/// (meaning: keep the original order) on timeout, a backend error, or a
/// result of the wrong length.
pub async fn try_rerank(
    encoder: &dyn CrossEncoder,
    query: &str,
    query_type: QueryType,
    candidates: &[(String, String)],
    call_timeout: Duration,
) -> Option<Vec<f64>> {
    let result = timeout(call_timeout, encoder.score(query, query_type, candidates)).await;
    match result {
        Ok(Ok(scores)) if scores.len() == candidates.len() => Some(scores),
        _ => None,
    }
}

/// Blends a cross-encoder score with the RRF score using the configured
/// weights.
#[must_use]
pub fn blend_scores(cross_encoder_score: f64, rrf_score: f64, cross_weight: f64, rrf_weight: f64) -> f64 {
    cross_encoder_score * cross_weight + rrf_score * rrf_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl CrossEncoder for AlwaysFails {
        async fn score(
            &self,
            _query: &str,
            _query_type: QueryType,
            _candidates: &[(String, String)],
        ) -> Result<Vec<f64>, String> {
            Err("backend unavailable".to_string())
        }
    }

    struct SlowSuccess;

    #[async_trait]
    impl CrossEncoder for SlowSuccess {
        async fn score(
            &self,
            _query: &str,
            _query_type: QueryType,
            candidates: &[(String, String)],
        ) -> Result<Vec<f64>, String> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec![1.0; candidates.len()])
        }
    }

    #[test]
    fn detects_temporal_when_time_hint_present() {
        assert_eq!(
            detect_query_type("what did we do", true),
            QueryType::Temporal
        );
    }

    #[test]
    fn detects_procedural() {
        assert_eq!(
            detect_query_type("how do I deploy this service", false),
            QueryType::Procedural
        );
    }

    #[test]
    fn detects_factual_and_exploratory() {
        assert_eq!(
            detect_query_type("what database did we choose", false),
            QueryType::Factual
        );
        assert_eq!(
            detect_query_type("tell me about the project", false),
            QueryType::Exploratory
        );
    }

    #[tokio::test]
    async fn backend_error_yields_none() {
        let candidates = vec![("c1".to_string(), "text".to_string())];
        let result = try_rerank(
            &AlwaysFails,
            "q",
            QueryType::Factual,
            &candidates,
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn timeout_yields_none() {
        let candidates = vec![("c1".to_string(), "text".to_string())];
        let result = try_rerank(
            &SlowSuccess,
            "q",
            QueryType::Factual,
            &candidates,
            Duration::from_millis(5),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn success_within_timeout_yields_scores() {
        let candidates = vec![("c1".to_string(), "text".to_string())];
        let result = try_rerank(
            &SlowSuccess,
            "q",
            QueryType::Factual,
            &candidates,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result, Some(vec![1.0]));
    }

    #[test]
    fn blend_weights_combine_linearly() {
        let blended = blend_scores(0.8, 0.4, 0.7, 0.3);
        assert!((blended - (0.8 * 0.7 + 0.4 * 0.3)).abs() < 1e-9);
    }
}
