//! External collaborator traits.
//!
//! Everything the pipeline needs from the rest of the service — chunk
//! storage, vector and lexical indexes, embedding computation, the
//! generative model, and the observability sink — is expressed as a
//! `Send + Sync` async trait object here. The pipeline never knows whether
//! a `VectorIndex` is backed by a local HNSW graph or a remote service;
//! it only knows the contract.

use async_trait::async_trait;

use crate::core::{Chunk, RetrievalLog};
use crate::error::{EmbeddingError, GenerationError, ObservabilityError, RetrievalError};

/// Point and batched lookup, plus tenant-scoped recency listing, for
/// indexed note chunks. No transactional guarantees are required.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Looks up a single chunk by identifier.
    async fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, RetrievalError>;

    /// Looks up many chunks in one call. Missing identifiers are omitted
    /// from the result rather than causing an error.
    async fn get_many(&self, chunk_ids: &[String]) -> Result<Vec<Chunk>, RetrievalError>;

    /// Lists the most recent chunks for a tenant, newest first, bounded by
    /// `since` (a Unix timestamp horizon) and `limit`.
    async fn list_recent(
        &self,
        tenant_id: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Chunk>, RetrievalError>;
}

/// One hit from a vector index k-nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Identifier of the matched chunk.
    pub chunk_id: String,
    /// Identifier of the note the chunk belongs to.
    pub note_id: String,
    /// Cosine similarity of the match, in `[-1, 1]`.
    pub cosine_score: f32,
}

/// Tenant-scoped k-nearest-neighbor search over precomputed embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `k` nearest neighbors of `query_embedding`, scoped to
    /// `tenant_id`. Implementations must support over-fetching: callers
    /// routinely ask for more than the final candidate count and filter
    /// afterward.
    async fn search(
        &self,
        tenant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, RetrievalError>;
}

/// One hit from a lexical (term-overlap) index query.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    /// Identifier of the matched chunk.
    pub chunk_id: String,
    /// Number of query terms this chunk's term list contained.
    pub matched_terms: usize,
}

/// Tenant-scoped set-contains-any query over normalized chunk term lists.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Returns chunks whose term list intersects `terms`, scoped to
    /// `tenant_id`, bounded by `limit`.
    async fn search(
        &self,
        tenant_id: &str,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<LexicalHit>, RetrievalError>;
}

/// Produces an embedding vector for a single text.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Dimensionality of vectors this backend produces.
    fn dimensions(&self) -> usize;

    /// Embeds `text`. Misconfiguration errors (missing credentials, wrong
    /// model) are non-retryable; see [`EmbeddingError::is_misconfiguration`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// A single completion request to the generative backend.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System instruction (persona, grammar guarantees, per-intent rules).
    pub system_instruction: String,
    /// The user-facing prompt, conditioned on the sources pack.
    pub user_prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Top-K sampling cutoff, if the backend supports it.
    pub top_k: Option<u32>,
    /// Top-P (nucleus) sampling cutoff, if the backend supports it.
    pub top_p: Option<f32>,
    /// Maximum number of output tokens.
    pub max_output_tokens: u32,
}

/// Text-in, text-out completion with a distinguishable error taxonomy.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// A short label identifying the backend/model, used in response
    /// metadata (e.g. `"gpt-4o-mini"`).
    fn model_label(&self) -> &str;

    /// Issues one completion request. Implementations must map their own
    /// failure modes onto [`GenerationError`]'s kinds so the generator's
    /// retry loop and the error boundary can react correctly.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Accepts one structured record per request.
///
/// The record type is [`RetrievalLog`] — the only business-record shape
/// this core emits. Sinks that need raw JSON can call
/// `serde_json::to_value` themselves; keeping the trait concrete avoids
/// type-erasure machinery for a single record type.
#[async_trait]
pub trait ObservabilitySink: Send + Sync {
    /// Records `log`. Failures here are local recoveries: the pipeline
    /// logs and discards them rather than failing the request.
    async fn record(&self, log: &RetrievalLog) -> Result<(), ObservabilityError>;
}
