//! External collaborator traits and their in-memory mock implementations.
//!
//! Everything outside the request pipeline proper — storage, search
//! indexes, embedding computation, the generative model, and the
//! observability sink — is a trait object here. Production wiring swaps
//! in real adapters; tests and the demo binary use [`mock`].

pub mod mock;
pub mod traits;

pub use traits::{
    ChunkStore, EmbeddingBackend, GenerationRequest, GenerativeBackend, LexicalHit, LexicalIndex,
    ObservabilitySink, VectorHit, VectorIndex,
};
