//! Error types for the retrieval-augmented answer pipeline.
//!
//! One top-level [`PipelineError`] wraps stage-specific sub-enums via
//! `#[from]`, mirroring a request's path: bad input is rejected before
//! retrieval starts, retrieval and generation each have their own failure
//! shapes, and a stage that overruns its deadline surfaces as `Timeout`
//! regardless of which stage it was.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Top-level error returned by the pipeline's public entry point.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The request itself was malformed.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// All retrieval sources failed; the pipeline has nothing to answer
    /// with. A single source failing is tolerated and never reaches here.
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// The generative backend failed in a way the retry loop could not
    /// recover from.
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// A stage exceeded its allotted time budget and was cancelled by the
    /// request scope.
    #[error("stage `{stage}` exceeded its time budget")]
    Timeout {
        /// Name of the stage that overran.
        stage: &'static str,
    },
}

impl PipelineError {
    /// Whether this error should be surfaced to the caller as a
    /// rate-limited response with retry-after metadata.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::Generation(GenerationError::RateLimited { .. })
        )
    }

    /// Whether this error should be surfaced as a 5xx-class
    /// service-unavailable response that is not retried by the caller.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Generation(GenerationError::Configuration(_)))
    }
}

/// Errors rejecting a request before any pipeline stage runs.
#[derive(Error, Debug)]
pub enum InputError {
    /// The question was empty after sanitization.
    #[error("question is empty")]
    EmptyQuestion,

    /// The question exceeded the configured maximum length.
    #[error("question exceeds maximum length of {max} characters")]
    QuestionTooLong {
        /// The configured maximum.
        max: usize,
    },

    /// The tenant identifier did not match `[A-Za-z0-9_-]{1,64}`.
    #[error("malformed tenant identifier")]
    MalformedTenant,
}

/// Errors from the hybrid retrieval stage.
///
/// Individual source failures (vector, lexical, recency) are tolerated by
/// the retriever and never constructed as this error; it is only raised
/// when every source has failed and there is nothing left to fuse.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Vector search, lexical search, and recency search all failed.
    #[error("all retrieval sources failed: {0}")]
    AllSourcesFailed(String),

    /// The chunk store failed on a lookup needed to enrich search hits.
    #[error("chunk store error: {0}")]
    ChunkStore(String),

    /// A single retrieval source (vector or lexical) failed. Tolerated by
    /// the retriever unless every attempted source fails the same way.
    #[error("retrieval source failed: {0}")]
    SourceFailed(String),
}

/// Errors from the generative backend, distinguished by how the caller
/// (and the generator's own retry loop) should react.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Request was well-formed but the arguments the backend received were
    /// invalid (e.g. an out-of-range temperature). Not retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Credentials or project configuration are missing or invalid. Not
    /// retried; surfaced as a 5xx-class service-unavailable error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend is rate-limiting the caller.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// A transient failure (connection reset, 5xx from the backend, etc.)
    /// that the retry loop already exhausted its attempts on.
    #[error("transient backend failure after {attempts} attempts: {message}")]
    Transient {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The last underlying failure message.
        message: String,
    },

    /// The attempt's hard per-call timeout elapsed.
    #[error("generation attempt timed out")]
    Timeout,
}

impl GenerationError {
    /// Whether this error is worth another attempt of the retry loop.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout) || matches!(self, Self::Transient { .. })
    }
}

/// Errors surfaced by the observability sink.
///
/// Sink failures are local recoveries: logged at `warn` and never
/// propagated to the caller, since a request's answer should not fail
/// because its trace could not be recorded.
#[derive(Error, Debug)]
pub enum ObservabilityError {
    /// The sink rejected or failed to persist the record.
    #[error("observability sink error: {0}")]
    SinkFailure(String),
}

/// Errors surfaced by the embedding backend.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The backend is misconfigured (missing credentials, wrong
    /// dimensionality, etc.); callers must not retry.
    #[error("embedding backend misconfigured: {0}")]
    Misconfigured(String),

    /// A transient failure while computing the embedding.
    #[error("embedding backend failure: {0}")]
    Backend(String),
}

impl EmbeddingError {
    /// Whether this failure indicates the backend itself is unusable,
    /// in which case the retriever should fall back to `keyword_only`
    /// mode rather than retry.
    #[must_use]
    pub const fn is_misconfiguration(&self) -> bool {
        matches!(self, Self::Misconfigured(_))
    }
}
