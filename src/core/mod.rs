//! Core domain models for the retrieval-augmented answer pipeline.
//!
//! This module contains the fundamental data structures used throughout the
//! request pipeline: chunks, scored chunks, query analysis, the sources
//! pack, the validated answer, and the retrieval log. These are pure domain
//! models with no I/O dependencies — every entity here is owned by the
//! request that created it and is released when the request returns (the
//! retrieval log is the only exception, handed to an external sink).

pub mod answer;
pub mod chunk;
pub mod query;
pub mod retrieval_log;
pub mod sources;

pub use answer::{ConfidenceLevel, EnhancedConfidence, ValidatedAnswer};
pub use chunk::{Chunk, ScoredChunk};
pub use query::{Intent, QueryAnalysis, TimeHint};
pub use retrieval_log::{QualityFlags, RetrievalLog, RetrievalMode, ScoreDistribution, StageTimings};
pub use sources::{Citation, SourcesPack};
