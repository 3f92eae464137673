//! Hybrid Retriever: runs vector, lexical, and recency search in
//! parallel, fuses their rankings, optionally reranks, and applies the
//! context-budget cutoff.

pub mod cache;
pub mod rerank;
pub mod rrf;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use crate::analyzer::tokenize::looks_like_identifier;
use crate::collaborators::traits::{ChunkStore, EmbeddingBackend, LexicalIndex, VectorIndex};
use crate::config::PipelineConfig;
use crate::core::{Chunk, QueryAnalysis, RetrievalMode, ScoredChunk, TimeHint};
use crate::error::RetrievalError;
use cache::EmbeddingCache;
use rerank::{CrossEncoder, QueryType};
use rrf::{RrfConfig, weighted_rrf};

const SECONDS_PER_DAY: i64 = 86_400;
const RECENCY_DECAY_DAYS: f64 = 30.0;

/// Optional narrowing constraints on which chunks may be retrieved.
///
/// `tags` is accepted for forward compatibility with collaborators that
/// index note tags, but this core has no chunk-level tag field to filter
/// on locally, so it is currently inert; real tag filtering belongs in the
/// `ChunkStore`/`VectorIndex`/`LexicalIndex` implementations themselves.
#[derive(Debug, Clone, Default)]
pub struct NoteFilters {
    /// Only retrieve chunks whose note identifier is in this set.
    pub include_note_ids: Option<Vec<String>>,
    /// Never retrieve chunks whose note identifier is in this set.
    pub exclude_note_ids: Option<Vec<String>>,
    /// Note tags to filter by (see struct docs: currently inert here).
    pub tags: Option<Vec<String>>,
    /// Only retrieve chunks created within `[start, end]` (Unix seconds).
    pub date_range: Option<(i64, i64)>,
    /// Drop chunks whose fused score falls below this floor.
    pub min_relevance: Option<f64>,
}

impl NoteFilters {
    fn passes(&self, chunk: &Chunk, fused_score: f64) -> bool {
        if let Some(include) = &self.include_note_ids
            && !include.contains(&chunk.note_id)
        {
            return false;
        }
        if let Some(exclude) = &self.exclude_note_ids
            && exclude.contains(&chunk.note_id)
        {
            return false;
        }
        if let Some((start, end)) = self.date_range
            && !(start..=end).contains(&chunk.created_at)
        {
            return false;
        }
        if let Some(floor) = self.min_relevance
            && fused_score < floor
        {
            return false;
        }
        true
    }
}

/// The collaborators and caches a single retrieval call needs. Borrowed
/// for the duration of one request; owned by the pipeline's request
/// scope.
pub struct RetrievalContext<'a> {
    /// Required: every request needs somewhere to fetch chunk text from.
    pub chunk_store: &'a dyn ChunkStore,
    /// Absent when vector search is not configured for this deployment.
    pub vector_index: Option<&'a dyn VectorIndex>,
    /// Absent alongside `vector_index`; both come from the same backend.
    pub embedding_backend: Option<&'a dyn EmbeddingBackend>,
    /// Absent when lexical search is not configured.
    pub lexical_index: Option<&'a dyn LexicalIndex>,
    /// Absent when cross-encoder reranking is not configured.
    pub cross_encoder: Option<&'a dyn CrossEncoder>,
    /// Process-wide embedding cache.
    pub embedding_cache: &'a EmbeddingCache,
    /// Pipeline tunables.
    pub config: &'a PipelineConfig,
}

/// Output of one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Retrieved chunks, ordered best-first, within the context budget.
    pub chunks: Vec<ScoredChunk>,
    /// Which sources contributed.
    pub mode: RetrievalMode,
    /// Raw candidate counts per source, before fusion: `(vector, lexical,
    /// recency)`.
    pub candidate_counts: (usize, usize, usize),
    /// Whether reranking actually ran (vs. being skipped or falling back
    /// to the original order).
    pub reranked: bool,
}

fn resolve_horizon_since(analysis: &QueryAnalysis, now: i64, default_days: u32) -> i64 {
    match &analysis.time_hint {
        Some(TimeHint::Relative(days)) => now - i64::from(*days) * SECONDS_PER_DAY,
        Some(TimeHint::Absolute(start, _end)) => *start,
        None => now - i64::from(default_days) * SECONDS_PER_DAY,
    }
}

async fn run_vector_search(
    ctx: &RetrievalContext<'_>,
    query: &str,
    tenant_id: &str,
    k: usize,
) -> Result<Vec<(String, f32)>, RetrievalError> {
    let (Some(vector_index), Some(embedding_backend)) = (ctx.vector_index, ctx.embedding_backend)
    else {
        return Ok(Vec::new());
    };

    let cache_key = EmbeddingCache::normalize_key(query);
    let embedding = if let Some(cached) = ctx.embedding_cache.get(&cache_key) {
        cached
    } else {
        let computed = embedding_backend
            .embed(query)
            .await
            .map_err(|e| RetrievalError::SourceFailed(format!("embedding backend: {e}")))?;
        ctx.embedding_cache
            .insert(cache_key, computed.clone());
        computed
    };

    let hits = vector_index
        .search(tenant_id, &embedding, k)
        .await
        .map_err(|e| RetrievalError::SourceFailed(format!("vector index: {e}")))?;

    Ok(hits
        .into_iter()
        .filter(|hit| hit.cosine_score >= ctx.config.min_cosine_score)
        .map(|hit| (hit.chunk_id, hit.cosine_score))
        .collect())
}

async fn run_lexical_search(
    ctx: &RetrievalContext<'_>,
    keywords: &[String],
    tenant_id: &str,
    k: usize,
) -> Result<Vec<(String, f64)>, RetrievalError> {
    let Some(lexical_index) = ctx.lexical_index else {
        return Ok(Vec::new());
    };
    if keywords.is_empty() {
        return Ok(Vec::new());
    }

    let hits = lexical_index
        .search(tenant_id, keywords, k)
        .await
        .map_err(|e| RetrievalError::SourceFailed(format!("lexical index: {e}")))?;

    #[allow(clippy::cast_precision_loss)]
    let total = keywords.len() as f64;
    Ok(hits
        .into_iter()
        .map(|hit| {
            let base = hit.matched_terms as f64 / total;
            let identifier_bonus = if keywords.iter().any(|k| looks_like_identifier(k)) {
                0.1
            } else {
                0.0
            };
            (hit.chunk_id, (base + identifier_bonus).min(1.0))
        })
        .collect())
}

fn recency_score(age_seconds: i64) -> f64 {
    let age_days = (age_seconds as f64 / SECONDS_PER_DAY as f64).max(0.0);
    (-age_days / RECENCY_DECAY_DAYS).exp()
}

fn ranking_by_desc_score<T: Copy>(
    scored: &[(String, T)],
    cmp: impl Fn(T, T) -> Ordering,
) -> Vec<String> {
    let mut items = scored.to_vec();
    items.sort_by(|a, b| cmp(b.1, a.1).then_with(|| a.0.cmp(&b.0)));
    items.into_iter().map(|(id, _)| id).collect()
}

/// Runs the full hybrid retrieval pipeline for one query.
///
/// # Errors
///
/// Returns [`RetrievalError::AllSourcesFailed`] only when every source
/// that was actually attempted (vector and lexical are skipped, not
/// counted as attempts, when their backends are unconfigured) failed.
pub async fn retrieve(
    ctx: &RetrievalContext<'_>,
    query: &str,
    analysis: &QueryAnalysis,
    tenant_id: &str,
    now: i64,
    filters: Option<&NoteFilters>,
) -> Result<RetrievalResult, RetrievalError> {
    let k = analysis.candidate_count;
    let overfetch_k = k * 2;
    let horizon_since = resolve_horizon_since(analysis, now, ctx.config.default_time_horizon_days);

    let vector_available = ctx.vector_index.is_some() && ctx.embedding_backend.is_some();
    let lexical_available = ctx.lexical_index.is_some();

    let vector_fut = run_vector_search(ctx, query, tenant_id, overfetch_k);
    let lexical_fut = run_lexical_search(ctx, &analysis.keywords, tenant_id, overfetch_k);
    let recency_fut = ctx
        .chunk_store
        .list_recent(tenant_id, horizon_since, overfetch_k);

    let (vector_result, lexical_result, recency_result) =
        tokio::join!(vector_fut, lexical_fut, recency_fut);

    let vector_errored = vector_available && vector_result.is_err();
    let lexical_errored = lexical_available && lexical_result.is_err();
    let recency_errored = recency_result.is_err();

    let attempted = usize::from(vector_available) + usize::from(lexical_available) + 1;
    let failed =
        usize::from(vector_errored) + usize::from(lexical_errored) + usize::from(recency_errored);
    if attempted == failed {
        return Err(RetrievalError::AllSourcesFailed(
            "vector, lexical, and recency search all failed".to_string(),
        ));
    }

    let vector_hits: Vec<(String, f32)> = vector_result.unwrap_or_default();
    let lexical_hits: Vec<(String, f64)> = lexical_result.unwrap_or_default();
    let recency_chunks: Vec<Chunk> = recency_result.unwrap_or_default();

    let candidate_counts = (vector_hits.len(), lexical_hits.len(), recency_chunks.len());

    let mut chunk_pool: HashMap<String, Chunk> = recency_chunks
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();

    let missing_ids: Vec<String> = vector_hits
        .iter()
        .map(|(id, _)| id.clone())
        .chain(lexical_hits.iter().map(|(id, _)| id.clone()))
        .filter(|id| !chunk_pool.contains_key(id))
        .collect();
    if !missing_ids.is_empty() {
        let fetched = ctx
            .chunk_store
            .get_many(&missing_ids)
            .await
            .map_err(|e| RetrievalError::ChunkStore(format!("{e}")))?;
        for chunk in fetched {
            chunk_pool.insert(chunk.id.clone(), chunk);
        }
    }

    // Tenant isolation: never let a mismatched chunk past this point.
    chunk_pool.retain(|_, chunk| chunk.tenant_id == tenant_id);

    let vector_scores: HashMap<String, f32> = vector_hits
        .iter()
        .filter(|(id, _)| {
            chunk_pool
                .get(id)
                .is_some_and(|c| c.created_at >= horizon_since)
        })
        .cloned()
        .collect();
    let vector_ranking = ranking_by_desc_score(
        &vector_hits
            .iter()
            .filter(|(id, _)| vector_scores.contains_key(id))
            .cloned()
            .collect::<Vec<_>>(),
        |a: f32, b: f32| a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    );

    let lexical_scores: HashMap<String, f64> = lexical_hits
        .iter()
        .filter(|(id, _)| chunk_pool.contains_key(id))
        .cloned()
        .collect();
    let lexical_ranking = ranking_by_desc_score(
        &lexical_hits
            .iter()
            .filter(|(id, _)| lexical_scores.contains_key(id))
            .cloned()
            .collect::<Vec<_>>(),
        |a: f64, b: f64| a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    );

    let recency_scores: HashMap<String, f64> = chunk_pool
        .values()
        .map(|c| (c.id.clone(), recency_score(c.age_seconds(now))))
        .collect();
    let mut recency_pairs: Vec<(String, f64)> = recency_scores
        .iter()
        .map(|(id, score)| (id.clone(), *score))
        .collect();
    recency_pairs.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    let recency_ranking: Vec<String> = recency_pairs.into_iter().map(|(id, _)| id).collect();

    let rrf_config = RrfConfig {
        k: ctx.config.rrf_k,
        multi_source_boost_per_extra: ctx.config.multi_source_boost_per_extra,
    };
    let mut fused = weighted_rrf(
        &[
            (vector_ranking.as_slice(), ctx.config.rrf_weight_vector),
            (lexical_ranking.as_slice(), ctx.config.rrf_weight_lexical),
            (recency_ranking.as_slice(), ctx.config.rrf_weight_recency),
        ],
        &rrf_config,
    );

    // Break exact ties by strongest component score, then chunk id (rrf.rs
    // already breaks ties by chunk id; this additionally considers
    // component scores when the RRF score is identical).
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let strongest = |id: &str| -> f64 {
                    vector_scores.get(id).map_or(0.0, |v| f64::from(*v))
                        .max(lexical_scores.get(id).copied().unwrap_or(0.0))
                        .max(recency_scores.get(id).copied().unwrap_or(0.0))
                };
                strongest(&b.chunk_id)
                    .partial_cmp(&strongest(&a.chunk_id))
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    let mode = if !vector_available {
        RetrievalMode::KeywordOnly
    } else if vector_ranking.is_empty() && lexical_ranking.is_empty() {
        RetrievalMode::Fallback
    } else if lexical_ranking.is_empty() {
        RetrievalMode::Vector
    } else {
        RetrievalMode::Hybrid
    };

    let mut scored_chunks: Vec<ScoredChunk> = fused
        .into_iter()
        .filter_map(|f| {
            let chunk = chunk_pool.get(&f.chunk_id)?.clone();
            if let Some(filters) = filters
                && !filters.passes(&chunk, f.score)
            {
                return None;
            }
            let mut sc = ScoredChunk::new(chunk, f.score);
            sc.vector_score = vector_scores.get(&f.chunk_id).copied();
            sc.lexical_score = lexical_scores.get(&f.chunk_id).copied();
            sc.recency_score = recency_scores.get(&f.chunk_id).copied();
            sc.source_count = f.source_count;
            Some(sc)
        })
        .collect();

    let rerank_width = ctx
        .config
        .rerank_width(k)
        .min(ctx.config.cross_encoder_candidate_cap)
        .min(scored_chunks.len());
    let mut reranked = false;
    if let Some(cross_encoder) = ctx.cross_encoder
        && rerank_width > 0
    {
        let query_type = rerank::detect_query_type(query, analysis.time_hint.is_some());
        let candidates: Vec<(String, String)> = scored_chunks[..rerank_width]
            .iter()
            .map(|sc| (sc.chunk.id.clone(), sc.chunk.text.clone()))
            .collect();
        if let Some(cross_scores) = rerank::try_rerank(
            cross_encoder,
            query,
            query_type,
            &candidates,
            Duration::from_secs(5),
        )
        .await
        {
            for (sc, cross_score) in scored_chunks[..rerank_width].iter_mut().zip(cross_scores) {
                sc.cross_encoder_score = Some(cross_score);
                sc.score = rerank::blend_scores(
                    cross_score,
                    sc.score,
                    ctx.config.cross_encoder_blend_weight,
                    ctx.config.rrf_blend_weight,
                );
            }
            scored_chunks[..rerank_width].sort_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
            });
            reranked = true;
        }
    }

    let mut output = Vec::new();
    let mut remaining_budget = ctx.config.context_budget_chars;
    for sc in scored_chunks {
        let len = sc.chunk.text.chars().count();
        if len > remaining_budget {
            break;
        }
        remaining_budget -= len;
        output.push(sc);
    }

    Ok(RetrievalResult {
        chunks: output,
        mode,
        candidate_counts,
        reranked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_score_decays_with_age() {
        let fresh = recency_score(0);
        let old = recency_score(60 * SECONDS_PER_DAY);
        assert!(fresh > old);
        assert!(fresh <= 1.0);
    }

    #[test]
    fn note_filters_respect_include_list() {
        let filters = NoteFilters {
            include_note_ids: Some(vec!["n1".to_string()]),
            ..Default::default()
        };
        let chunk = Chunk::new("c1", "n2", "t1", "text", 0, 0);
        assert!(!filters.passes(&chunk, 0.5));
        let chunk2 = Chunk::new("c2", "n1", "t1", "text", 0, 0);
        assert!(filters.passes(&chunk2, 0.5));
    }

    #[test]
    fn note_filters_respect_min_relevance() {
        let filters = NoteFilters {
            min_relevance: Some(0.5),
            ..Default::default()
        };
        let chunk = Chunk::new("c1", "n1", "t1", "text", 0, 0);
        assert!(!filters.passes(&chunk, 0.4));
        assert!(filters.passes(&chunk, 0.6));
    }

    #[test]
    fn resolve_horizon_uses_default_when_no_hint() {
        let analysis = QueryAnalysis::fallback("q", 10);
        let since = resolve_horizon_since(&analysis, 1_000_000, 90);
        assert_eq!(since, 1_000_000 - 90 * SECONDS_PER_DAY);
    }
}
