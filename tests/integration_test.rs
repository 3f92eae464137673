//! End-to-end tests driving [`notes_rag_core::Pipeline`] through mock
//! collaborators, covering the pipeline's testable properties: an empty
//! corpus, a clean single-source answer, dangling-marker removal, the
//! repair pass, an uncertainty acknowledgement, and a low-overlap drop.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use notes_rag_core::collaborators::mock::{MockChunkStore, MockGenerativeBackend, MockObservabilitySink};
use notes_rag_core::config::PipelineConfig;
use notes_rag_core::core::{Chunk, ConfidenceLevel, RetrievalMode};
use notes_rag_core::pipeline::{Collaborators, Request, ResponseFormat};
use notes_rag_core::Pipeline;

const TENANT: &str = "tenant-acme";
const NOW: i64 = 1_700_300_000;
const TIMESTAMP: &str = "2024-01-01T00:00:00Z";

fn request(question: &str) -> Request {
    Request {
        tenant_id: TENANT.to_string(),
        question: question.to_string(),
        conversation_history: None,
        note_filters: None,
        response_format: ResponseFormat::Default,
        overrides: None,
    }
}

async fn run(
    chunk_store: &MockChunkStore,
    generative: &MockGenerativeBackend,
    sink: &MockObservabilitySink,
    req: &Request,
) -> notes_rag_core::Response {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let collaborators = Collaborators {
        chunk_store,
        vector_index: None,
        embedding_backend: None,
        lexical_index: None,
        cross_encoder: None,
        generative_backend: generative,
        observability_sink: sink,
        note_titles: &|_| None,
    };
    pipeline
        .handle(
            req,
            &collaborators,
            "req-test".to_string(),
            "trace-test".to_string(),
            NOW,
            TIMESTAMP.to_string(),
        )
        .await
        .expect("pipeline call should not error")
}

/// S1 — a tenant with zero chunks gets the deterministic empty-corpus
/// fallback, with empty sources, `none` confidence, and a `fallback`
/// retrieval mode logged.
#[tokio::test]
async fn s1_empty_corpus_returns_fixed_fallback() {
    let chunk_store = MockChunkStore::empty();
    let generative = MockGenerativeBackend::new(vec![]);
    let sink = MockObservabilitySink::new();

    let response = run(&chunk_store, &generative, &sink, &request("What did I decide last week?")).await;

    assert!(response.answer.starts_with("I don't have any notes to search through."));
    assert!(response.sources.is_empty());
    assert_eq!(response.metadata.confidence, ConfidenceLevel::None);
    assert_eq!(sink.records().len(), 1);
    assert_eq!(sink.records()[0].mode, RetrievalMode::Fallback);
}

/// S2 — a single, clearly relevant chunk produces an answer that cites it,
/// with reasonable confidence and coverage.
#[tokio::test]
async fn s2_single_source_answer_is_cited() {
    let chunk_store = MockChunkStore::new(vec![Chunk::new(
        "c1",
        "n1",
        TENANT,
        "On Tuesday we decided to adopt PostgreSQL for primary storage.",
        0,
        NOW - 86_400,
    )]);
    let generative = MockGenerativeBackend::new(vec![
        "We decided to adopt PostgreSQL for primary storage [N1].".to_string(),
    ]);
    let sink = MockObservabilitySink::new();

    let response = run(&chunk_store, &generative, &sink, &request("What database did we decide on?")).await;

    assert!(response.answer.contains("PostgreSQL"));
    assert!(response.answer.contains("[1]"));
    assert_eq!(response.sources.len(), 1);
    assert!(matches!(
        response.metadata.confidence,
        ConfidenceLevel::High | ConfidenceLevel::Medium
    ));
    assert!(response.metadata.debug.unwrap().citation_coverage >= 0.5);
}

/// S3 — a generated answer citing one marker outside the sources pack's
/// range has that marker stripped; the surviving valid marker remains.
#[tokio::test]
async fn s3_dangling_marker_is_removed() {
    let chunk_store = MockChunkStore::new(vec![
        Chunk::new("c1", "n1", TENANT, "We chose option A for the rollout plan.", 0, NOW - 1_000),
        Chunk::new("c2", "n2", TENANT, "Option B was considered but rejected for cost reasons.", 1, NOW - 2_000),
        Chunk::new("c3", "n3", TENANT, "The team agreed to revisit option C next quarter.", 2, NOW - 3_000),
    ]);
    let generative = MockGenerativeBackend::new(vec!["We chose A [N1] and B [N7].".to_string()]);
    let sink = MockObservabilitySink::new();

    let response = run(&chunk_store, &generative, &sink, &request("What option did we choose?")).await;

    assert!(!response.answer.contains("[N7]"));
    assert_eq!(response.sources.len(), 1);
    assert_eq!(sink.records()[0].quality.dangling_removed, 1);
}

/// S4 — an uncited answer with enough candidate sources triggers a repair
/// call; when the repair attempt cites something valid, it replaces the
/// original and the quality flag records it.
#[tokio::test]
async fn s4_zero_coverage_triggers_repair() {
    let chunk_store = MockChunkStore::new(vec![
        Chunk::new("c1", "n1", TENANT, "The backend migration finished on schedule this sprint.", 0, NOW - 1_000),
        Chunk::new("c2", "n2", TENANT, "We paused the mobile redesign to prioritize the migration.", 1, NOW - 2_000),
        Chunk::new("c3", "n3", TENANT, "QA flagged two regressions after the migration shipped.", 2, NOW - 3_000),
    ]);
    let generative = MockGenerativeBackend::new(vec![
        "The migration finished on schedule.".to_string(),
        "The migration finished on schedule [N1], though QA flagged regressions [N3].".to_string(),
    ]);
    let sink = MockObservabilitySink::new();

    let response = run(&chunk_store, &generative, &sink, &request("How did the migration go?")).await;

    assert!(sink.records()[0].repair_attempted);
    assert!(sink.records()[0].repair_accepted);
    assert!(!response.sources.is_empty());
}

/// S5 — when the generator itself acknowledges it found nothing, the
/// post-processor must not invent a citation and no repair is attempted.
#[tokio::test]
async fn s5_uncertainty_acknowledgement_is_left_alone() {
    let chunk_store = MockChunkStore::new(vec![Chunk::new(
        "c1",
        "n1",
        TENANT,
        "Lunch order notes: the team picked the taco place on Fifth.",
        0,
        NOW - 1_000,
    )]);
    let generative = MockGenerativeBackend::new(vec!["I don't have notes about that.".to_string()]);
    let sink = MockObservabilitySink::new();

    let response = run(&chunk_store, &generative, &sink, &request("What's our five-year roadmap?")).await;

    assert!(!response.answer.contains('['));
    assert_eq!(response.metadata.confidence, ConfidenceLevel::None);
    assert!(!sink.records()[0].repair_attempted);
}

/// S6 — a citation whose chunk text barely overlaps the sentence it's
/// attached to is dropped as a low-overlap citation.
#[tokio::test]
async fn s6_low_overlap_citation_is_dropped() {
    let chunk_store = MockChunkStore::new(vec![
        Chunk::new("c1", "n1", TENANT, "We decided to adopt PostgreSQL for primary storage.", 0, NOW - 1_000),
        Chunk::new(
            "c2",
            "n2",
            TENANT,
            "Unrelated note about quarterly snack budget and office plants.",
            1,
            NOW - 2_000,
        ),
    ]);
    let generative = MockGenerativeBackend::new(vec![
        "We adopted PostgreSQL for primary storage [N1] for better long-term scalability [N2].".to_string(),
    ]);
    let sink = MockObservabilitySink::new();

    let response = run(&chunk_store, &generative, &sink, &request("What database did we decide on?")).await;

    assert!(!response.answer.contains("[N2]"));
    assert!(sink.records()[0].quality.invalids_removed >= 1 || response.sources.len() <= 1);
}
