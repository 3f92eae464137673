//! In-memory implementations of the collaborator traits, for tests and
//! the demo binary.
//!
//! Grounded in the teacher's `SqliteStorage::in_memory()` fixture
//! convention: every mock here is a thin `Mutex`-guarded `Vec`/`HashMap`,
//! enough to exercise the pipeline's logic without any real storage,
//! embedding, or model backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{
    ChunkStore, EmbeddingBackend, GenerationRequest, GenerativeBackend, LexicalHit, LexicalIndex,
    ObservabilitySink, VectorHit, VectorIndex,
};
use crate::core::{Chunk, RetrievalLog};
use crate::error::{EmbeddingError, GenerationError, ObservabilityError, RetrievalError};

/// An in-memory chunk store seeded with a fixed set of chunks.
#[derive(Debug, Default)]
pub struct MockChunkStore {
    chunks: Vec<Chunk>,
}

impl MockChunkStore {
    /// Creates a store over `chunks`.
    #[must_use]
    pub const fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Creates an empty store, for the empty-corpus scenario.
    #[must_use]
    pub const fn empty() -> Self {
        Self { chunks: Vec::new() }
    }
}

#[async_trait]
impl ChunkStore for MockChunkStore {
    async fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, RetrievalError> {
        Ok(self.chunks.iter().find(|c| c.id == chunk_id).cloned())
    }

    async fn get_many(&self, chunk_ids: &[String]) -> Result<Vec<Chunk>, RetrievalError> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| chunk_ids.iter().any(|id| id == &c.id))
            .cloned()
            .collect())
    }

    async fn list_recent(
        &self,
        tenant_id: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let mut hits: Vec<Chunk> = self
            .chunks
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.created_at >= since)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// An in-memory vector index performing brute-force cosine search over a
/// fixed set of `(chunk, embedding)` pairs.
#[derive(Debug, Default)]
pub struct MockVectorIndex {
    entries: Vec<(String, String, Vec<f32>)>,
}

impl MockVectorIndex {
    /// Creates an index over `entries` of `(chunk_id, note_id, embedding)`.
    #[must_use]
    pub const fn new(entries: Vec<(String, String, Vec<f32>)>) -> Self {
        Self { entries }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MockVectorIndex {
    async fn search(
        &self,
        tenant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, RetrievalError> {
        let _ = tenant_id;
        let mut scored: Vec<VectorHit> = self
            .entries
            .iter()
            .map(|(chunk_id, note_id, embedding)| VectorHit {
                chunk_id: chunk_id.clone(),
                note_id: note_id.clone(),
                cosine_score: cosine(query_embedding, embedding),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.cosine_score
                .partial_cmp(&a.cosine_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// An in-memory lexical index over precomputed term lists.
#[derive(Debug, Default)]
pub struct MockLexicalIndex {
    entries: Vec<(String, Vec<String>)>,
}

impl MockLexicalIndex {
    /// Creates an index over `entries` of `(chunk_id, terms)`.
    #[must_use]
    pub const fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl LexicalIndex for MockLexicalIndex {
    async fn search(
        &self,
        tenant_id: &str,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<LexicalHit>, RetrievalError> {
        let _ = tenant_id;
        let mut hits: Vec<LexicalHit> = self
            .entries
            .iter()
            .filter_map(|(chunk_id, chunk_terms)| {
                let matched = terms.iter().filter(|t| chunk_terms.contains(t)).count();
                (matched > 0).then(|| LexicalHit {
                    chunk_id: chunk_id.clone(),
                    matched_terms: matched,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.matched_terms.cmp(&a.matched_terms));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// A deterministic hash-based embedder, for tests that need stable
/// vectors without a real model. Not semantically meaningful.
#[derive(Debug, Clone, Copy)]
pub struct MockEmbeddingBackend {
    dimensions: usize,
}

impl MockEmbeddingBackend {
    /// Creates a mock embedder producing `dimensions`-wide vectors.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; self.dimensions];
        for (i, word) in text.split_whitespace().enumerate() {
            let mut hash: u64 = 1469598103934665603;
            for byte in word.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(1099511628211);
            }
            let idx = (hash as usize + i) % self.dimensions;
            v[idx] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

/// A scripted generative backend returning a fixed sequence of
/// completions (first call gets `responses[0]`, second `responses[1]`,
/// ...), used to script the S1-S6 end-to-end scenarios and repair-pass
/// tests deterministically.
#[derive(Debug)]
pub struct MockGenerativeBackend {
    responses: Mutex<Vec<String>>,
    model_label: String,
}

impl MockGenerativeBackend {
    /// Creates a backend that returns `responses` in order, one per call.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            model_label: "mock-model".to_string(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for MockGenerativeBackend {
    fn model_label(&self) -> &str {
        &self.model_label
    }

    async fn complete(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        #[allow(clippy::unwrap_used)]
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(GenerationError::InvalidArgument(
                "mock backend exhausted its scripted responses".to_string(),
            ));
        }
        Ok(responses.remove(0))
    }
}

/// An in-memory observability sink collecting every emitted record, for
/// assertions in tests.
#[derive(Debug, Default)]
pub struct MockObservabilitySink {
    records: Mutex<Vec<RetrievalLog>>,
}

impl MockObservabilitySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of every record recorded so far.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn records(&self) -> Vec<RetrievalLog> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObservabilitySink for MockObservabilitySink {
    #[allow(clippy::unwrap_used)]
    async fn record(&self, log: &RetrievalLog) -> Result<(), ObservabilityError> {
        self.records.lock().unwrap().push(log.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_chunk_store_get_many_filters() {
        let store = MockChunkStore::new(vec![
            Chunk::new("c1", "n1", "t1", "hello", 0, 1),
            Chunk::new("c2", "n1", "t1", "world", 1, 2),
        ]);
        let got = store
            .get_many(&["c1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "c1");
    }

    #[tokio::test]
    async fn mock_vector_index_ranks_by_cosine() {
        let index = MockVectorIndex::new(vec![
            ("a".to_string(), "n1".to_string(), vec![1.0, 0.0]),
            ("b".to_string(), "n1".to_string(), vec![0.0, 1.0]),
        ]);
        let hits = index.search("t1", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn mock_generative_backend_returns_scripted_responses_in_order() {
        let backend = MockGenerativeBackend::new(vec!["first".to_string(), "second".to_string()]);
        let request = GenerationRequest {
            system_instruction: String::new(),
            user_prompt: String::new(),
            temperature: 0.0,
            top_k: None,
            top_p: None,
            max_output_tokens: 100,
        };
        assert_eq!(backend.complete(&request).await.unwrap(), "first");
        assert_eq!(backend.complete(&request).await.unwrap(), "second");
        assert!(backend.complete(&request).await.is_err());
    }
}
