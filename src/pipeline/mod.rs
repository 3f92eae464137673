//! Pipeline: assembles the Query Analyzer, Hybrid Retriever, Sources Pack
//! Builder, Prompt Builder, Generator, Citation Validator, Post-Processor,
//! Confidence Scorer, and Observer into one request/response call.
//!
//! Grounded in the pack's agent-orchestration shape (a long-lived
//! coordinator owning process-wide singletons — a semaphore, a cache — with
//! one method per inbound request) generalized from dynamic sub-agent
//! fan-out to this core's fixed nine-stage chain. The per-tenant rate
//! limiter follows the same `Mutex<HashMap<..>>` style used by the
//! embedding cache.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::analyzer;
use crate::collaborators::traits::{
    ChunkStore, EmbeddingBackend, GenerationRequest, GenerativeBackend, LexicalIndex,
    ObservabilitySink, VectorIndex,
};
use crate::config::PipelineConfig;
use crate::confidence::{self, is_uncertainty_acknowledgement};
use crate::core::{
    Citation, ConfidenceLevel, EnhancedConfidence, Intent, QueryAnalysis, RetrievalMode,
    ScoredChunk, SourcesPack, StageTimings,
};
use crate::error::{GenerationError, InputError, PipelineError, Result, RetrievalError};
use crate::generator;
use crate::observability::{self, RecordInputs};
use crate::postprocess;
use crate::prompt::{self, PromptTier};
use crate::retrieval::cache::EmbeddingCache;
use crate::retrieval::rerank::CrossEncoder;
use crate::retrieval::{self, NoteFilters, RetrievalContext, RetrievalResult};
use crate::sources;
use crate::validator::{self, ValidationOutcome};

const EMPTY_CORPUS_MESSAGE: &str =
    "I don't have any notes to search through. Try creating some notes first!";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 800;
const MAX_TENANT_ID_LEN: usize = 64;
const NOTE_ID_PREFIX_LEN: usize = 8;

/// One turn of prior conversation, supplied for context only. This core
/// never persists or summarizes history across requests; a turn older
/// than the current question is only ever rendered back into the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    /// `"user"` or `"assistant"`, caller-supplied.
    pub role: String,
    /// The turn's text.
    pub content: String,
}

/// Requested shape of the answer text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// No additional formatting directive.
    #[default]
    Default,
    /// Two or three sentences.
    Concise,
    /// Cover every relevant source thoroughly.
    Detailed,
    /// A bulleted list.
    Bullet,
    /// Short headed sections for a multi-topic answer.
    Structured,
}

/// Per-request overrides of the pipeline's default generation behavior.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    /// Overrides the default sampling temperature.
    pub temperature: Option<f32>,
    /// Overrides the default maximum output tokens.
    pub max_output_tokens: Option<u32>,
    /// Top-K sampling cutoff, if the backend supports it.
    pub top_k: Option<u32>,
    /// Top-P sampling cutoff, if the backend supports it.
    pub top_p: Option<f32>,
    /// When `Some(false)`, the repair pass never runs even if the
    /// validator would otherwise trigger it.
    pub enable_citation_verification: Option<bool>,
    /// A natural-language hint appended to the system instruction, e.g.
    /// `"French"`.
    pub language_hint: Option<String>,
    /// Replaces the generated system instruction outright.
    pub custom_system_prompt: Option<String>,
}

/// One call into the pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    /// Tenant identifier; must match `[A-Za-z0-9_-]{1,64}`.
    pub tenant_id: String,
    /// The user's question, before pipeline-level sanitization.
    pub question: String,
    /// Prior turns, rendered back into the prompt for context.
    pub conversation_history: Option<Vec<ConversationTurn>>,
    /// Narrowing constraints on which chunks may be retrieved.
    pub note_filters: Option<NoteFilters>,
    /// Requested answer shape.
    pub response_format: ResponseFormat,
    /// Per-request overrides of generation behavior.
    pub overrides: Option<RequestOverrides>,
}

/// One cited or context-only source surfaced in a [`Response`].
#[derive(Debug, Clone, PartialEq)]
pub struct CitedSource {
    /// External marker number, matching `[<marker>]` in the answer text
    /// for a cited source; unused (left at `0`) for a context source.
    pub marker: u32,
    /// Identifier of the source note.
    pub note_id: String,
    /// The query-aware snippet shown to the generator.
    pub preview: String,
    /// The source chunk's creation date, formatted `YYYY-MM-DD`.
    pub formatted_date: String,
    /// The fused relevance score the chunk had when packed.
    pub relevance: f64,
    /// Character offset range within the note, if tracked upstream.
    pub offsets: Option<(usize, usize)>,
    /// Deep-link anchor within the note, if the chunk carried one.
    pub anchor: Option<String>,
}

/// Diagnostic detail behind one response, for callers that want it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugInfo {
    /// Which retrieval sources contributed.
    pub retrieval_mode: RetrievalMode,
    /// `(vector, lexical, recency)` candidate counts before fusion.
    pub candidate_counts: (usize, usize, usize),
    /// Number of chunks retained after fusion and the budget cutoff.
    pub retained_count: usize,
    /// Whether cross-encoder reranking ran.
    pub reranked: bool,
    /// Final citation coverage, before renumbering.
    pub citation_coverage: f64,
    /// Number of dangling markers the validator stripped.
    pub dangling_removed: usize,
    /// Number of valid-but-low-overlap markers the validator dropped.
    pub invalids_removed: usize,
    /// Whether the repair pass ran.
    pub repair_attempted: bool,
    /// Whether the repair pass's output was accepted.
    pub repair_accepted: bool,
    /// The four weighted confidence sub-scores.
    pub confidence_breakdown: confidence::ConfidenceBreakdown,
    /// Post-processor tone-consistency score.
    pub tone_consistency: f64,
    /// Post-processor citation-placement-consistency score.
    pub citation_placement_consistency: f64,
    /// Post-processor list-style-consistency score.
    pub list_style_consistency: f64,
}

/// Metadata accompanying one [`Response`].
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Short label identifying the generative backend/model used.
    pub model_label: String,
    /// Echoes the caller-supplied or generated request identifier.
    pub request_id: String,
    /// Total wall-clock time spent handling the request.
    pub elapsed_ms: u64,
    /// The detected query intent.
    pub intent: Intent,
    /// Four-level confidence exposed externally.
    pub confidence: ConfidenceLevel,
    /// Five-level internal confidence.
    pub enhanced_confidence: EnhancedConfidence,
    /// Number of sources offered to the generator.
    pub source_count: usize,
    /// Present only when the caller opted into debug detail.
    pub debug: Option<DebugInfo>,
}

/// The pipeline's response to one [`Request`].
#[derive(Debug, Clone)]
pub struct Response {
    /// The final answer text, with dense external `[<int>]` markers.
    pub answer: String,
    /// Sources actually cited in `answer`, in marker order.
    pub sources: Vec<CitedSource>,
    /// Sources supplied to the generator but not cited.
    pub context_sources: Vec<CitedSource>,
    /// Metadata about how the answer was produced.
    pub metadata: ResponseMetadata,
}

/// Everything the pipeline needs from the rest of the service for one
/// request: the six required collaborators, the optional cross-encoder,
/// and a note-title lookup. Borrowed for the request's duration.
pub struct Collaborators<'a> {
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
    /// Required: the model that turns a prompt into an answer.
    pub generative_backend: &'a dyn GenerativeBackend,
    /// Required: where the per-request retrieval log is sent.
    pub observability_sink: &'a dyn ObservabilitySink,
    /// Looks up a note's human-readable title by identifier.
    pub note_titles: &'a dyn Fn(&str) -> Option<String>,
}

struct RateWindow {
    window_start: i64,
    count: u32,
}

/// Owns the process-wide singletons a pipeline instance needs across
/// requests: the embedding cache, the generative-backend concurrency cap,
/// and the per-tenant rate limiter.
pub struct Pipeline {
    config: PipelineConfig,
    embedding_cache: EmbeddingCache,
    generation_semaphore: Semaphore,
    rate_limiter: Mutex<HashMap<String, RateWindow>>,
}

impl Pipeline {
    /// Creates a pipeline instance from `config`, sizing the embedding
    /// cache and generation semaphore from its tunables.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let embedding_cache = EmbeddingCache::new(
            config.embedding_cache_capacity,
            Duration::from_secs(config.embedding_cache_ttl_secs),
            Duration::from_secs(config.embedding_cache_promoted_ttl_secs),
            config.embedding_cache_promotion_hits,
        );
        let generation_semaphore = Semaphore::new(config.external_model_semaphore_width);
        Self {
            config,
            embedding_cache,
            generation_semaphore,
            rate_limiter: Mutex::new(HashMap::new()),
        }
    }

    /// This pipeline instance's configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[allow(clippy::unwrap_used)]
    fn check_rate_limit(&self, tenant_id: &str, now: i64) -> Result<()> {
        let eviction_secs = i64::try_from(self.config.rate_limit_eviction_secs).unwrap_or(i64::MAX);
        let window_secs = i64::try_from(self.config.rate_limit_window_secs).unwrap_or(i64::MAX);

        let mut limiter = self.rate_limiter.lock().unwrap();
        limiter.retain(|_, w| now - w.window_start < eviction_secs);

        let window = limiter.entry(tenant_id.to_string()).or_insert(RateWindow {
            window_start: now,
            count: 0,
        });
        if now - window.window_start >= window_secs {
            window.window_start = now;
            window.count = 0;
        }
        window.count += 1;

        if window.count > self.config.rate_limit_max_requests {
            let retry_after_secs = window_secs.saturating_sub(now - window.window_start).max(0);
            #[allow(clippy::cast_sign_loss)]
            return Err(PipelineError::Generation(GenerationError::RateLimited {
                retry_after_secs: retry_after_secs as u64,
            }));
        }
        Ok(())
    }

    /// Runs the full nine-stage pipeline for one request: analysis,
    /// retrieval, sources-pack assembly, prompting, generation,
    /// validation with an optional repair pass, post-processing,
    /// confidence scoring, and observability emission.
    ///
    /// `now` and `timestamp` are supplied by the caller; this core has no
    /// wall-clock access of its own.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Input`] for a malformed request,
    /// [`PipelineError::Retrieval`] only when every retrieval source
    /// failed, [`PipelineError::Generation`] when the generator exhausts
    /// its retries, and [`PipelineError::Timeout`] if the request's
    /// overall time budget elapses. The empty-corpus and no-evidence
    /// fallbacks never error — they return a deterministic [`Response`].
    pub async fn handle(
        &self,
        request: &Request,
        collaborators: &Collaborators<'_>,
        request_id: String,
        trace_id: String,
        now: i64,
        timestamp: String,
    ) -> Result<Response> {
        self.check_rate_limit(&request.tenant_id, now)?;
        validate_request(request, &self.config)?;

        // Request scope: the whole chain is one deadline. Retrieval's own
        // sub-tasks are a bounded `tokio::join!` inside `retrieve`, so a
        // single outer timeout already cancels every outstanding piece of
        // work when it fires; the token exists to give the caller (and a
        // future per-stage cancellation point) an explicit cancel signal
        // distinct from "the future was simply dropped".
        let cancellation = CancellationToken::new();
        let budget = Duration::from_secs(
            self.config.generator_attempt_timeout_secs * u64::from(self.config.generator_max_attempts)
                + 30,
        );

        let outcome = tokio::time::timeout(
            budget,
            self.run(request, collaborators, request_id, trace_id, now, timestamp),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                cancellation.cancel();
                Err(PipelineError::Timeout { stage: "pipeline" })
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn run(
        &self,
        request: &Request,
        collaborators: &Collaborators<'_>,
        request_id: String,
        trace_id: String,
        now: i64,
        timestamp: String,
    ) -> Result<Response> {
        let start = Instant::now();
        let mut timings = StageTimings::default();

        let t0 = Instant::now();
        let analysis = analyzer::analyze(&request.question, &self.config);
        timings.analyze_ms = elapsed_ms(t0);

        let t0 = Instant::now();
        let retrieval_ctx = RetrievalContext {
            chunk_store: collaborators.chunk_store,
            vector_index: collaborators.vector_index,
            embedding_backend: collaborators.embedding_backend,
            lexical_index: collaborators.lexical_index,
            cross_encoder: collaborators.cross_encoder,
            embedding_cache: &self.embedding_cache,
            config: &self.config,
        };
        let retrieval_result = match retrieval::retrieve(
            &retrieval_ctx,
            &request.question,
            &analysis,
            &request.tenant_id,
            now,
            request.note_filters.as_ref(),
        )
        .await
        {
            Ok(result) => result,
            Err(RetrievalError::AllSourcesFailed(_)) => {
                return Ok(self
                    .empty_corpus_response(request, &analysis, &request_id, &trace_id, &timestamp, start, collaborators)
                    .await);
            }
            Err(err) => return Err(err.into()),
        };
        timings.retrieve_ms = elapsed_ms(t0);

        if retrieval_result.chunks.is_empty() {
            return Ok(self
                .empty_corpus_response(request, &analysis, &request_id, &trace_id, &timestamp, start, collaborators)
                .await);
        }

        let t0 = Instant::now();
        let pack = sources::build_sources_pack(
            &retrieval_result.chunks,
            &analysis.keywords,
            &self.config,
            collaborators.note_titles,
        );
        timings.pack_ms = elapsed_ms(t0);

        let t0 = Instant::now();
        let (mut system_instruction, built_user_prompt) =
            prompt::build_prompt(&request.question, &pack, analysis.intent, PromptTier::default());
        let overrides = request.overrides.as_ref();
        if let Some(custom) = overrides.and_then(|o| o.custom_system_prompt.as_ref()) {
            system_instruction = custom.clone();
        }
        if let Some(lang) = overrides.and_then(|o| o.language_hint.as_ref()) {
            let _ = write!(system_instruction, " Respond in {lang}.");
        }
        system_instruction.push_str(response_format_directive(request.response_format));
        let user_prompt = render_with_history(&built_user_prompt, request.conversation_history.as_deref());
        timings.prompt_ms = elapsed_ms(t0);

        let t0 = Instant::now();
        let generation_request = GenerationRequest {
            system_instruction: system_instruction.clone(),
            user_prompt,
            temperature: overrides.and_then(|o| o.temperature).unwrap_or(DEFAULT_TEMPERATURE),
            top_k: overrides.and_then(|o| o.top_k),
            top_p: overrides.and_then(|o| o.top_p),
            max_output_tokens: overrides
                .and_then(|o| o.max_output_tokens)
                .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        };
        let raw_answer = generator::generate(
            collaborators.generative_backend,
            &self.generation_semaphore,
            &generation_request,
            &self.config,
        )
        .await?;
        timings.generate_ms = elapsed_ms(t0);

        let t0 = Instant::now();
        let pre_repair = validator::validate(&raw_answer, &pack, Some(&retrieval_result.chunks), &self.config);
        timings.validate_ms = elapsed_ms(t0);

        let verification_enabled = overrides.and_then(|o| o.enable_citation_verification).unwrap_or(true);
        let mut outcome = pre_repair.clone();
        let mut repair_attempted = false;
        let mut repair_accepted = false;
        if verification_enabled && validator::should_repair(&pre_repair, pack.citations.len(), &self.config) {
            repair_attempted = true;
            let t_repair = Instant::now();
            let repair_system = format!(
                "{system_instruction}\n\nYour previous answer failed citation validation. \
                 Re-answer the same question, citing every factual claim."
            );
            let repair_request = GenerationRequest {
                system_instruction: repair_system,
                ..generation_request.clone()
            };
            if let Ok(repaired_answer) = generator::generate(
                collaborators.generative_backend,
                &self.generation_semaphore,
                &repair_request,
                &self.config,
            )
            .await
            {
                let repaired_outcome =
                    validator::validate(&repaired_answer, &pack, Some(&retrieval_result.chunks), &self.config);
                if validator::accept_repair(&pre_repair, &repaired_outcome) {
                    outcome = repaired_outcome;
                    repair_accepted = true;
                }
            }
            timings.generate_ms += elapsed_ms(t_repair);
        }

        let is_uncertainty = is_uncertainty_acknowledgement(&outcome.text);
        if outcome.valid_markers.is_empty() && !is_uncertainty {
            return Ok(self
                .no_evidence_response(
                    request,
                    &analysis,
                    &retrieval_result,
                    &pack,
                    &outcome,
                    repair_attempted,
                    repair_accepted,
                    &request_id,
                    &trace_id,
                    &timestamp,
                    start,
                    timings,
                    collaborators,
                )
                .await);
        }

        let t0 = Instant::now();
        let post = postprocess::post_process(&outcome.text, &outcome.valid_markers);
        timings.postprocess_ms = elapsed_ms(t0);

        // `post.citation_markers` is the authoritative set of new, dense
        // markers that actually survived into `post.text` — postprocess's
        // trailing-citation-only-sentence clip can drop the last entry of
        // `outcome.valid_markers`, so sources are built from this set, not
        // the pre-clip one, to keep `Response` consistent with the answer.
        let surviving: Vec<(u32, &Citation)> = post
            .citation_markers
            .iter()
            .filter_map(|&new_marker| {
                let old_marker = *outcome.valid_markers.get(usize::try_from(new_marker).ok()?.checked_sub(1)?)?;
                pack.get(old_marker).map(|citation| (new_marker, citation))
            })
            .collect();

        let t0 = Instant::now();
        let cited_scores: Vec<f64> = surviving.iter().map(|(_, citation)| citation.score).collect();
        let confidence_outcome = confidence::score(
            &post.text,
            &post.citation_markers,
            &cited_scores,
            analysis.intent,
            &self.config,
        );
        timings.confidence_ms = elapsed_ms(t0);

        let cited_sources: Vec<CitedSource> = surviving
            .iter()
            .map(|(new_marker, citation)| CitedSource {
                marker: *new_marker,
                note_id: citation.note_id.clone(),
                preview: citation.snippet.clone(),
                formatted_date: formatted_date(&retrieval_result.chunks, &citation.chunk_id),
                relevance: citation.score,
                offsets: citation.offsets,
                anchor: citation.anchor.clone(),
            })
            .collect();

        let citation_summaries: Vec<(u32, String, f64)> = cited_sources
            .iter()
            .map(|c| (c.marker, note_id_prefix(&c.note_id), c.relevance))
            .collect();

        let record = observability::build_record(RecordInputs {
            request_id: request_id.clone(),
            trace_id: trace_id.clone(),
            tenant_id: request.tenant_id.clone(),
            query: &request.question,
            intent: analysis.intent,
            mode: retrieval_result.mode,
            candidate_counts: retrieval_result.candidate_counts,
            merged_count: retrieval_result.chunks.len(),
            after_rerank_count: retrieval_result.chunks.len(),
            retained: &retrieval_result.chunks,
            citation_summaries,
            repair_attempted,
            repair_accepted,
            dangling_removed: outcome.dangling_markers.len(),
            invalids_removed: outcome.dropped_markers.len(),
            citation_coverage: outcome.citation_coverage,
            fallback_used: false,
            answer_text: &post.text,
            timings,
            timestamp,
        });
        observability::emit_warnings(&record, is_uncertainty, &self.config);
        if let Err(err) = collaborators.observability_sink.record(&record).await {
            tracing::warn!(request_id = %request_id, error = %err, "failed to record observability log");
        }

        Ok(Response {
            answer: post.text,
            sources: cited_sources,
            context_sources: Vec::new(),
            metadata: ResponseMetadata {
                model_label: collaborators.generative_backend.model_label().to_string(),
                request_id,
                elapsed_ms: elapsed_ms(start),
                intent: analysis.intent,
                confidence: confidence_outcome.legacy,
                enhanced_confidence: confidence_outcome.enhanced,
                source_count: pack.citations.len(),
                debug: Some(DebugInfo {
                    retrieval_mode: retrieval_result.mode,
                    candidate_counts: retrieval_result.candidate_counts,
                    retained_count: retrieval_result.chunks.len(),
                    reranked: retrieval_result.reranked,
                    citation_coverage: outcome.citation_coverage,
                    dangling_removed: outcome.dangling_markers.len(),
                    invalids_removed: outcome.dropped_markers.len(),
                    repair_attempted,
                    repair_accepted,
                    confidence_breakdown: confidence_outcome.breakdown,
                    tone_consistency: post.tone_consistency,
                    citation_placement_consistency: post.citation_placement_consistency,
                    list_style_consistency: post.list_style_consistency,
                }),
            },
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn empty_corpus_response(
        &self,
        request: &Request,
        analysis: &QueryAnalysis,
        request_id: &str,
        trace_id: &str,
        timestamp: &str,
        start: Instant,
        collaborators: &Collaborators<'_>,
    ) -> Response {
        let record = observability::build_record(RecordInputs {
            request_id: request_id.to_string(),
            trace_id: trace_id.to_string(),
            tenant_id: request.tenant_id.clone(),
            query: &request.question,
            intent: analysis.intent,
            mode: RetrievalMode::Fallback,
            candidate_counts: (0, 0, 0),
            merged_count: 0,
            after_rerank_count: 0,
            retained: &[],
            citation_summaries: Vec::new(),
            repair_attempted: false,
            repair_accepted: false,
            dangling_removed: 0,
            invalids_removed: 0,
            citation_coverage: 0.0,
            fallback_used: true,
            answer_text: EMPTY_CORPUS_MESSAGE,
            timings: StageTimings::default(),
            timestamp: timestamp.to_string(),
        });
        observability::emit_warnings(&record, false, &self.config);
        if let Err(err) = collaborators.observability_sink.record(&record).await {
            tracing::warn!(request_id = %request_id, error = %err, "failed to record observability log");
        }

        Response {
            answer: EMPTY_CORPUS_MESSAGE.to_string(),
            sources: Vec::new(),
            context_sources: Vec::new(),
            metadata: ResponseMetadata {
                model_label: collaborators.generative_backend.model_label().to_string(),
                request_id: request_id.to_string(),
                elapsed_ms: elapsed_ms(start),
                intent: analysis.intent,
                confidence: ConfidenceLevel::None,
                enhanced_confidence: EnhancedConfidence::VeryLow,
                source_count: 0,
                debug: None,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn no_evidence_response(
        &self,
        request: &Request,
        analysis: &QueryAnalysis,
        retrieval_result: &RetrievalResult,
        pack: &SourcesPack,
        outcome: &ValidationOutcome,
        repair_attempted: bool,
        repair_accepted: bool,
        request_id: &str,
        trace_id: &str,
        timestamp: &str,
        start: Instant,
        timings: StageTimings,
        collaborators: &Collaborators<'_>,
    ) -> Response {
        let answer = no_evidence_message(pack);

        let record = observability::build_record(RecordInputs {
            request_id: request_id.to_string(),
            trace_id: trace_id.to_string(),
            tenant_id: request.tenant_id.clone(),
            query: &request.question,
            intent: analysis.intent,
            mode: retrieval_result.mode,
            candidate_counts: retrieval_result.candidate_counts,
            merged_count: retrieval_result.chunks.len(),
            after_rerank_count: retrieval_result.chunks.len(),
            retained: &retrieval_result.chunks,
            citation_summaries: Vec::new(),
            repair_attempted,
            repair_accepted,
            dangling_removed: outcome.dangling_markers.len(),
            invalids_removed: outcome.dropped_markers.len(),
            citation_coverage: outcome.citation_coverage,
            fallback_used: true,
            answer_text: &answer,
            timings,
            timestamp: timestamp.to_string(),
        });
        observability::emit_warnings(&record, false, &self.config);
        if let Err(err) = collaborators.observability_sink.record(&record).await {
            tracing::warn!(request_id = %request_id, error = %err, "failed to record observability log");
        }

        Response {
            answer,
            sources: Vec::new(),
            context_sources: Vec::new(),
            metadata: ResponseMetadata {
                model_label: collaborators.generative_backend.model_label().to_string(),
                request_id: request_id.to_string(),
                elapsed_ms: elapsed_ms(start),
                intent: analysis.intent,
                confidence: ConfidenceLevel::None,
                enhanced_confidence: EnhancedConfidence::VeryLow,
                source_count: 0,
                debug: None,
            },
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn note_id_prefix(note_id: &str) -> String {
    note_id.chars().take(NOTE_ID_PREFIX_LEN).collect()
}

fn formatted_date(chunks: &[ScoredChunk], chunk_id: &str) -> String {
    chunks
        .iter()
        .find(|sc| sc.chunk.id == chunk_id)
        .and_then(|sc| chrono::DateTime::from_timestamp(sc.chunk.created_at, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn response_format_directive(format: ResponseFormat) -> &'static str {
    match format {
        ResponseFormat::Default => "",
        ResponseFormat::Concise => " Keep the answer to two or three sentences.",
        ResponseFormat::Detailed => " Give a thorough answer covering every relevant source.",
        ResponseFormat::Bullet => " Format the answer as a bulleted list.",
        ResponseFormat::Structured => " Use short headed sections if the answer covers more than one topic.",
    }
}

fn render_with_history(user_prompt: &str, history: Option<&[ConversationTurn]>) -> String {
    let Some(turns) = history.filter(|t| !t.is_empty()) else {
        return user_prompt.to_string();
    };
    let mut rendered = String::from("Prior conversation:\n");
    for turn in turns {
        let _ = writeln!(rendered, "{}: {}", turn.role, turn.content);
    }
    rendered.push('\n');
    rendered.push_str(user_prompt);
    rendered
}

fn no_evidence_message(pack: &SourcesPack) -> String {
    let mut titles: Vec<&str> = pack.citations.iter().filter_map(|c| c.title.as_deref()).collect();
    titles.sort_unstable();
    titles.dedup();

    if titles.is_empty() {
        "I found some notes but couldn't verify an answer closely enough to cite them. \
         Try rephrasing your question."
            .to_string()
    } else {
        format!(
            "I couldn't verify an answer closely enough to cite your notes, but they do cover: {}. \
             Try rephrasing your question.",
            titles.join(", ")
        )
    }
}

fn is_valid_tenant(tenant_id: &str) -> bool {
    !tenant_id.is_empty()
        && tenant_id.len() <= MAX_TENANT_ID_LEN
        && tenant_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate_request(request: &Request, config: &PipelineConfig) -> Result<()> {
    if request.question.trim().is_empty() {
        return Err(InputError::EmptyQuestion.into());
    }
    if request.question.chars().count() > config.max_question_chars {
        return Err(InputError::QuestionTooLong {
            max: config.max_question_chars,
        }
        .into());
    }
    if !is_valid_tenant(&request.tenant_id) {
        return Err(InputError::MalformedTenant.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::{
        MockChunkStore, MockGenerativeBackend, MockObservabilitySink,
    };
    use crate::core::Chunk;

    fn sample_request(tenant_id: &str, question: &str) -> Request {
        Request {
            tenant_id: tenant_id.to_string(),
            question: question.to_string(),
            conversation_history: None,
            note_filters: None,
            response_format: ResponseFormat::Default,
            overrides: None,
        }
    }

    fn collaborators<'a>(
        chunk_store: &'a MockChunkStore,
        generative: &'a MockGenerativeBackend,
        sink: &'a MockObservabilitySink,
    ) -> Collaborators<'a> {
        Collaborators {
            chunk_store,
            vector_index: None,
            embedding_backend: None,
            lexical_index: None,
            cross_encoder: None,
            generative_backend: generative,
            observability_sink: sink,
            note_titles: &|_| None,
        }
    }

    #[test]
    fn rejects_empty_question() {
        let config = PipelineConfig::default();
        let request = sample_request("tenant-a", "   ");
        assert!(matches!(
            validate_request(&request, &config),
            Err(PipelineError::Input(InputError::EmptyQuestion))
        ));
    }

    #[test]
    fn rejects_malformed_tenant() {
        let config = PipelineConfig::default();
        let request = sample_request("bad tenant!", "what database did we choose?");
        assert!(matches!(
            validate_request(&request, &config),
            Err(PipelineError::Input(InputError::MalformedTenant))
        ));
    }

    #[test]
    fn rejects_question_over_the_configured_limit() {
        let config = PipelineConfig::default();
        let request = sample_request("tenant-a", &"a".repeat(config.max_question_chars + 1));
        assert!(matches!(
            validate_request(&request, &config),
            Err(PipelineError::Input(InputError::QuestionTooLong { .. }))
        ));
    }

    #[test]
    fn rate_limiter_trips_after_the_configured_max() {
        let config = PipelineConfig::builder().with_rate_limit(2, 60).build();
        let pipeline = Pipeline::new(config);
        assert!(pipeline.check_rate_limit("tenant-a", 1_000).is_ok());
        assert!(pipeline.check_rate_limit("tenant-a", 1_001).is_ok());
        assert!(pipeline.check_rate_limit("tenant-a", 1_002).is_err());
    }

    #[test]
    fn rate_limiter_resets_after_the_window_elapses() {
        let config = PipelineConfig::builder().with_rate_limit(1, 60).build();
        let pipeline = Pipeline::new(config);
        assert!(pipeline.check_rate_limit("tenant-a", 1_000).is_ok());
        assert!(pipeline.check_rate_limit("tenant-a", 1_030).is_err());
        assert!(pipeline.check_rate_limit("tenant-a", 1_100).is_ok());
    }

    #[tokio::test]
    async fn empty_corpus_returns_deterministic_fallback() {
        let store = MockChunkStore::empty();
        let generative = MockGenerativeBackend::new(vec![]);
        let sink = MockObservabilitySink::new();
        let pipeline = Pipeline::new(PipelineConfig::default());
        let request = sample_request("tenant-a", "What did I decide last week?");

        let response = pipeline
            .handle(
                &request,
                &collaborators(&store, &generative, &sink),
                "req-1".to_string(),
                "trace-1".to_string(),
                1_000,
                "2024-01-01T00:00:00Z".to_string(),
            )
            .await
            .unwrap();

        assert!(response.answer.starts_with("I don't have any notes to search through."));
        assert!(response.sources.is_empty());
        assert_eq!(response.metadata.confidence, ConfidenceLevel::None);
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].mode, RetrievalMode::Fallback);
    }

    #[tokio::test]
    async fn zero_citations_after_failed_repair_returns_no_evidence_fallback() {
        let store = MockChunkStore::new(vec![Chunk::new(
            "c1",
            "n1",
            "tenant-a",
            "We chose Postgres for storage because it scales well.",
            0,
            0,
        )]);
        let generative = MockGenerativeBackend::new(vec![
            "A is important.".to_string(),
            "Still nothing to cite here.".to_string(),
        ]);
        let sink = MockObservabilitySink::new();
        let pipeline = Pipeline::new(PipelineConfig::default());
        let request = sample_request("tenant-a", "What database did we choose?");

        let response = pipeline
            .handle(
                &request,
                &collaborators(&store, &generative, &sink),
                "req-2".to_string(),
                "trace-2".to_string(),
                1_000,
                "2024-01-01T00:00:00Z".to_string(),
            )
            .await
            .unwrap();

        assert!(response.sources.is_empty());
        assert_eq!(response.metadata.confidence, ConfidenceLevel::None);
        assert!(sink.records()[0].repair_attempted);
    }

    #[tokio::test]
    async fn well_cited_answer_surfaces_its_source() {
        let store = MockChunkStore::new(vec![Chunk::new(
            "c1",
            "n1",
            "tenant-a",
            "We chose Postgres for storage because it scales well.",
            0,
            0,
        )]);
        let generative = MockGenerativeBackend::new(vec![
            "We chose Postgres for storage because it scales well [N1].".to_string(),
        ]);
        let sink = MockObservabilitySink::new();
        let pipeline = Pipeline::new(PipelineConfig::default());
        let request = sample_request("tenant-a", "What database did we choose?");

        let response = pipeline
            .handle(
                &request,
                &collaborators(&store, &generative, &sink),
                "req-3".to_string(),
                "trace-3".to_string(),
                1_000,
                "2024-01-01T00:00:00Z".to_string(),
            )
            .await
            .unwrap();

        assert!(response.answer.contains("Postgres"));
        assert!(response.answer.contains("[1]"));
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].note_id, "n1");
        assert_ne!(response.metadata.confidence, ConfidenceLevel::None);
    }
}
