//! Chunk and scored-chunk representations.
//!
//! A [`Chunk`] is a passage of indexed note text, as produced by chunking
//! and embedding pipelines this core does not own. A [`ScoredChunk`] wraps
//! a chunk with the fused relevance score and per-source component scores
//! computed for a single request; it never outlives that request.

use serde::{Deserialize, Serialize};

/// A passage of indexed note text belonging to a single tenant.
///
/// # Invariants
///
/// - [`Chunk::id`] is globally unique.
/// - [`Chunk::tenant_id`] is non-empty and immutable for the chunk's lifetime.
/// - [`Chunk::created_at`] is monotone within a single note's chunks.
/// - If both `embedding` and `terms` are `None`, the chunk cannot be
///   retrieved by any search source (enforced by the retriever, not this
///   type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Globally unique chunk identifier.
    pub id: String,
    /// Identifier of the note this chunk belongs to.
    pub note_id: String,
    /// Identifier of the tenant that owns this chunk.
    pub tenant_id: String,
    /// The chunk's text content.
    pub text: String,
    /// Ordinal position of this chunk within its note.
    pub ordinal: u32,
    /// Unix timestamp (seconds) the chunk was created.
    pub created_at: i64,
    /// Precomputed embedding vector, if the embedding backend has run.
    pub embedding: Option<Vec<f32>>,
    /// Precomputed lexical terms (normalized, deduplicated), if available.
    pub terms: Option<Vec<String>>,
    /// Text immediately preceding this chunk in its note, for snippet context.
    pub prev_context: Option<String>,
    /// Text immediately following this chunk in its note, for snippet context.
    pub next_context: Option<String>,
    /// Character offset range within the note, if tracked upstream.
    pub offsets: Option<(usize, usize)>,
    /// An anchor string (e.g. a heading or block id) for deep-linking.
    pub anchor: Option<String>,
}

impl Chunk {
    /// Creates a minimal chunk with no precomputed embedding or terms.
    ///
    /// Such a chunk is not retrievable until at least one of `embedding` or
    /// `terms` is attached.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        note_id: impl Into<String>,
        tenant_id: impl Into<String>,
        text: impl Into<String>,
        ordinal: u32,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            note_id: note_id.into(),
            tenant_id: tenant_id.into(),
            text: text.into(),
            ordinal,
            created_at,
            embedding: None,
            terms: None,
            prev_context: None,
            next_context: None,
            offsets: None,
            anchor: None,
        }
    }

    /// Attaches a precomputed embedding vector.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Attaches precomputed lexical terms.
    #[must_use]
    pub fn with_terms(mut self, terms: Vec<String>) -> Self {
        self.terms = Some(terms);
        self
    }

    /// Attaches surrounding-context strings for snippet extension.
    #[must_use]
    pub fn with_context(mut self, prev: Option<String>, next: Option<String>) -> Self {
        self.prev_context = prev;
        self.next_context = next;
        self
    }

    /// Attaches character offsets and an anchor string.
    #[must_use]
    pub fn with_anchor(mut self, offsets: Option<(usize, usize)>, anchor: Option<String>) -> Self {
        self.offsets = offsets;
        self.anchor = anchor;
        self
    }

    /// Whether this chunk is eligible for retrieval at all.
    ///
    /// A chunk with neither an embedding nor lexical terms cannot be
    /// surfaced by vector or lexical search; only recency search can still
    /// reach it.
    #[must_use]
    pub fn has_retrievable_signal(&self) -> bool {
        self.embedding.is_some() || self.terms.is_some()
    }

    /// Age of the chunk in seconds relative to `now`.
    #[must_use]
    pub fn age_seconds(&self, now: i64) -> i64 {
        (now - self.created_at).max(0)
    }
}

/// A chunk plus the fused relevance signal computed for one request.
///
/// Lives only for the duration of a single request; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The underlying chunk.
    pub chunk: Chunk,
    /// Fused relevance score in `[0, 1]`.
    pub score: f64,
    /// Vector-search component score (cosine similarity), if vector search
    /// contributed to this chunk's ranking.
    pub vector_score: Option<f32>,
    /// Lexical-search component score (keyword overlap fraction), if
    /// lexical search contributed.
    pub lexical_score: Option<f64>,
    /// Recency-search component score (exponential age decay), if recency
    /// search contributed.
    pub recency_score: Option<f64>,
    /// Cross-encoder rerank score, if reranking ran and scored this chunk.
    pub cross_encoder_score: Option<f64>,
    /// Number of retrieval sources that independently surfaced this chunk.
    pub source_count: u8,
}

impl ScoredChunk {
    /// Creates a scored chunk with only a fused score, no component scores.
    #[must_use]
    pub const fn new(chunk: Chunk, score: f64) -> Self {
        Self {
            chunk,
            score,
            vector_score: None,
            lexical_score: None,
            recency_score: None,
            cross_encoder_score: None,
            source_count: 0,
        }
    }

    /// The chunk identifier, convenience accessor.
    #[must_use]
    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }
}
