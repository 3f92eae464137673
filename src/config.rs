//! Pipeline configuration.
//!
//! [`PipelineConfig`] collects every tunable named across the component
//! design: retrieval weights and caps, the citation-overlap thresholds,
//! cache lifetimes, concurrency widths, and the generator's retry
//! schedule. [`PipelineConfig::default()`] matches the defaults described
//! in the component design; callers needing different values go through
//! [`PipelineConfigBuilder`].

/// All tunables governing one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum question length, in characters, after sanitization.
    pub max_question_chars: usize,
    /// Base adaptive candidate count K.
    pub candidate_k_base: usize,
    /// Upper cap on the adaptive candidate count.
    pub candidate_k_cap: usize,
    /// Rerank width is this many times the adaptive K.
    pub rerank_width_multiplier: usize,
    /// Maximum number of candidates ever passed to the cross-encoder,
    /// regardless of rerank width.
    pub cross_encoder_candidate_cap: usize,
    /// Context budget for the sources pack, in characters.
    pub context_budget_chars: usize,
    /// Default retrieval time horizon when no time hint is present, in
    /// days.
    pub default_time_horizon_days: u32,
    /// Minimum cosine score for a vector hit to be retained.
    pub min_cosine_score: f32,

    /// RRF's `k` constant.
    pub rrf_k: u32,
    /// Vector source weight in RRF.
    pub rrf_weight_vector: f64,
    /// Lexical source weight in RRF.
    pub rrf_weight_lexical: f64,
    /// Recency source weight in RRF.
    pub rrf_weight_recency: f64,
    /// Fractional score boost applied per additional contributing source,
    /// beyond the first, after RRF.
    pub multi_source_boost_per_extra: f64,

    /// Cross-encoder score weight when blending with the RRF score.
    pub cross_encoder_blend_weight: f64,
    /// RRF score weight when blending with the cross-encoder score.
    /// Kept separate from `1.0 - cross_encoder_blend_weight` so the two
    /// can be configured independently if they are ever made to not sum
    /// to one.
    pub rrf_blend_weight: f64,

    /// Minimum acceptable keyword overlap for a citation to be kept.
    pub overlap_accept_threshold: f64,
    /// Fraction of `overlap_accept_threshold` below which a citation is
    /// dropped rather than merely flagged suspicious.
    pub overlap_suspicious_ratio: f64,
    /// Maximum citation markers retained per sentence.
    pub markers_per_sentence_cap: usize,
    /// Coverage threshold below which a repair pass triggers, provided at
    /// least `min_sources_for_repair` sources were offered.
    pub repair_coverage_threshold: f64,
    /// Minimum number of offered sources for low coverage to trigger
    /// repair.
    pub min_sources_for_repair: usize,
    /// Coverage threshold below which a `warn`-level observability event
    /// fires (stricter than the repair trigger).
    pub coverage_warn_threshold: f64,
    /// Score-distribution gap (top minus second) above which a
    /// single-source-dominance warning fires.
    pub score_gap_warn_threshold: f64,

    /// Maximum snippet length, in characters.
    pub snippet_char_cap: usize,

    /// Embedding cache capacity (entry count).
    pub embedding_cache_capacity: usize,
    /// Default embedding cache entry TTL, in seconds.
    pub embedding_cache_ttl_secs: u64,
    /// Promoted TTL granted after `embedding_cache_promotion_hits` hits.
    pub embedding_cache_promoted_ttl_secs: u64,
    /// Hit count after which an entry's TTL is promoted.
    pub embedding_cache_promotion_hits: u32,

    /// Process-wide cap on simultaneous generative-backend calls.
    pub external_model_semaphore_width: usize,

    /// Per-user rate-limit window, in seconds.
    pub rate_limit_window_secs: u64,
    /// Maximum requests allowed per `rate_limit_window_secs`.
    pub rate_limit_max_requests: u32,
    /// Age after which an idle rate-limit entry is evicted, in seconds.
    pub rate_limit_eviction_secs: u64,

    /// Hard per-attempt timeout for a generator call, in seconds.
    pub generator_attempt_timeout_secs: u64,
    /// Maximum generator attempts (including the first) before surfacing
    /// a transient failure.
    pub generator_max_attempts: u32,
    /// Base backoff delay between generator attempts, in seconds.
    pub generator_backoff_base_secs: u64,
    /// Backoff multiplicative factor per attempt.
    pub generator_backoff_factor: u32,
    /// Backoff delay cap, in seconds.
    pub generator_backoff_cap_secs: u64,

    /// Relevance score below which a cited chunk contributes nothing to
    /// the source-relevance confidence sub-score.
    pub confidence_relevance_floor: f64,
    /// Whether the optional per-citation overlap/entity/semantic scorer
    /// runs. Off by default: it is not needed for the aggregate
    /// confidence score and costs an extra pass over every citation.
    pub enable_per_citation_scoring: bool,
    /// Minimum per-citation score (when the per-citation scorer is
    /// enabled) below which a citation is logged as weakly supported.
    pub per_citation_score_floor: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_question_chars: 2000,
            candidate_k_base: 20,
            candidate_k_cap: 50,
            rerank_width_multiplier: 3,
            cross_encoder_candidate_cap: 50,
            context_budget_chars: 6000,
            default_time_horizon_days: 90,
            min_cosine_score: 0.2,

            rrf_k: 60,
            rrf_weight_vector: 1.0,
            rrf_weight_lexical: 0.8,
            rrf_weight_recency: 0.3,
            multi_source_boost_per_extra: 0.15,

            cross_encoder_blend_weight: 0.7,
            rrf_blend_weight: 0.3,

            overlap_accept_threshold: 0.15,
            overlap_suspicious_ratio: 0.5,
            markers_per_sentence_cap: 3,
            repair_coverage_threshold: 0.50,
            min_sources_for_repair: 3,
            coverage_warn_threshold: 0.60,
            score_gap_warn_threshold: 0.3,

            snippet_char_cap: 280,

            embedding_cache_capacity: 1000,
            embedding_cache_ttl_secs: 300,
            embedding_cache_promoted_ttl_secs: 3600,
            embedding_cache_promotion_hits: 3,

            external_model_semaphore_width: 10,

            rate_limit_window_secs: 60,
            rate_limit_max_requests: 100,
            rate_limit_eviction_secs: 300,

            generator_attempt_timeout_secs: 30,
            generator_max_attempts: 3,
            generator_backoff_base_secs: 1,
            generator_backoff_factor: 2,
            generator_backoff_cap_secs: 30,

            confidence_relevance_floor: 0.2,
            enable_per_citation_scoring: false,
            per_citation_score_floor: 0.3,
        }
    }
}

impl PipelineConfig {
    /// Starts a builder seeded with [`PipelineConfig::default`].
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder(Self::default())
    }

    /// Rerank width for a given adaptive candidate count `k`.
    #[must_use]
    pub const fn rerank_width(&self, k: usize) -> usize {
        k * self.rerank_width_multiplier
    }
}

/// Consuming builder for [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder(PipelineConfig);

impl PipelineConfigBuilder {
    /// Overrides the context budget.
    #[must_use]
    pub const fn with_context_budget_chars(mut self, chars: usize) -> Self {
        self.0.context_budget_chars = chars;
        self
    }

    /// Overrides the base adaptive candidate count.
    #[must_use]
    pub const fn with_candidate_k_base(mut self, k: usize) -> Self {
        self.0.candidate_k_base = k;
        self
    }

    /// Overrides the candidate count cap.
    #[must_use]
    pub const fn with_candidate_k_cap(mut self, cap: usize) -> Self {
        self.0.candidate_k_cap = cap;
        self
    }

    /// Overrides the citation overlap acceptance threshold.
    #[must_use]
    pub const fn with_overlap_accept_threshold(mut self, threshold: f64) -> Self {
        self.0.overlap_accept_threshold = threshold;
        self
    }

    /// Overrides the process-wide generative-backend concurrency cap.
    #[must_use]
    pub const fn with_external_model_semaphore_width(mut self, width: usize) -> Self {
        self.0.external_model_semaphore_width = width;
        self
    }

    /// Overrides the per-user rate limit.
    #[must_use]
    pub const fn with_rate_limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.0.rate_limit_max_requests = max_requests;
        self.0.rate_limit_window_secs = window_secs;
        self
    }

    /// Overrides the generator's retry schedule.
    #[must_use]
    pub const fn with_generator_retries(mut self, max_attempts: u32, timeout_secs: u64) -> Self {
        self.0.generator_max_attempts = max_attempts;
        self.0.generator_attempt_timeout_secs = timeout_secs;
        self
    }

    /// Overrides whether the optional per-citation scorer runs.
    #[must_use]
    pub const fn with_per_citation_scoring(mut self, enabled: bool) -> Self {
        self.0.enable_per_citation_scoring = enabled;
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub fn build(self) -> PipelineConfig {
        self.0
    }
}
