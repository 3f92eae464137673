//! # notes-rag-core
//!
//! Retrieval-augmented question answering over a tenant's personal notes:
//! hybrid (vector + lexical + recency) retrieval, citation-aware prompting,
//! answer validation against the retrieved evidence, and confidence
//! scoring, tied together by [`pipeline::Pipeline`].
//!
//! ## Modules
//!
//! - [`pipeline`] — the top-level orchestrator; start here.
//! - [`analyzer`] — query intent classification and keyword extraction.
//! - [`retrieval`] — hybrid search, fusion, and optional reranking.
//! - [`sources`] — builds the citable sources pack from retrieved chunks.
//! - [`prompt`] — renders the system/user prompt pair for the generator.
//! - [`generator`] — calls the generative backend with retry and backoff.
//! - [`validator`] — checks citation markers against the sources pack.
//! - [`postprocess`] — renumbers citations and normalizes answer text.
//! - [`confidence`] — scores the final answer's confidence.
//! - [`observability`] — structured per-request logging.
//! - [`collaborators`] — the external-service traits a deployment wires up.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod analyzer;
pub mod collaborators;
pub mod config;
pub mod confidence;
pub mod core;
pub mod error;
pub mod generator;
pub mod observability;
pub mod pipeline;
pub mod postprocess;
pub mod prompt;
pub mod retrieval;
pub mod sources;
pub mod textutil;
pub mod validator;

pub use error::{PipelineError, Result};
pub use pipeline::{Collaborators, Pipeline, Request, Response};
