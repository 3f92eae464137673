//! Demo driver for `notes-rag-core`.
//!
//! Seeds an in-memory corpus of sample notes and runs one question through
//! the full pipeline, printing the answer, its cited sources, and the
//! resulting confidence. Wires up [`collaborators::mock`] fixtures in
//! place of real storage/embedding/generative backends — a real deployment
//! supplies its own [`Collaborators`](notes_rag_core::Collaborators).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::Context as _;
use clap::Parser;
use notes_rag_core::collaborators::mock::{MockChunkStore, MockGenerativeBackend, MockObservabilitySink};
use notes_rag_core::config::PipelineConfig;
use notes_rag_core::core::Chunk;
use notes_rag_core::pipeline::{Collaborators, Request, ResponseFormat};
use notes_rag_core::{observability, Pipeline};

/// `notes-rag-demo`: ask one question against a seeded sample corpus.
#[derive(Parser, Debug)]
#[command(name = "notes-rag-demo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Tenant identifier the question is scoped to.
    #[arg(short, long, default_value = "demo-tenant")]
    tenant: String,

    /// The question to ask.
    #[arg(short, long, default_value = "What database did we decide on?")]
    question: String,
}

fn sample_corpus(tenant_id: &str) -> Vec<Chunk> {
    vec![
        Chunk::new(
            "chunk-1",
            "note-1",
            tenant_id,
            "On Tuesday we decided to adopt PostgreSQL for primary storage, \
             mainly because of its JSONB support and mature ecosystem.",
            0,
            1_700_000_000,
        ),
        Chunk::new(
            "chunk-2",
            "note-2",
            tenant_id,
            "Standup notes: the onboarding flow still needs a password-reset \
             screen before we can cut the next release.",
            0,
            1_700_100_000,
        ),
        Chunk::new(
            "chunk-3",
            "note-3",
            tenant_id,
            "Retro action item: add an index on the notes table's tenant_id \
             column, the dashboard query is too slow above 50k rows.",
            0,
            1_700_200_000,
        ),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let chunk_store = MockChunkStore::new(sample_corpus(&cli.tenant));
    let generative_backend = MockGenerativeBackend::new(vec![
        "We decided on PostgreSQL for primary storage [N1].".to_string(),
    ]);
    let observability_sink = MockObservabilitySink::new();

    let pipeline = Pipeline::new(PipelineConfig::default());
    let collaborators = Collaborators {
        chunk_store: &chunk_store,
        vector_index: None,
        embedding_backend: None,
        lexical_index: None,
        cross_encoder: None,
        generative_backend: &generative_backend,
        observability_sink: &observability_sink,
        note_titles: &|note_id| Some(format!("Untitled ({note_id})")),
    };

    let request = Request {
        tenant_id: cli.tenant,
        question: cli.question,
        conversation_history: None,
        note_filters: None,
        response_format: ResponseFormat::Default,
        overrides: None,
    };

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .context("system clock is before the Unix epoch")?
        .as_secs();
    #[allow(clippy::cast_possible_wrap)]
    let now = now as i64;
    let timestamp = chrono::DateTime::from_timestamp(now, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();

    let response = pipeline
        .handle(
            &request,
            &collaborators,
            uuid_like_id(),
            uuid_like_id(),
            now,
            timestamp,
        )
        .await
        .context("pipeline request failed")?;

    println!("{}", response.answer);
    println!();
    for source in &response.sources {
        println!(
            "[{}] note={} relevance={:.2} ({})",
            source.marker, source.note_id, source.relevance, source.formatted_date
        );
    }
    println!();
    println!(
        "confidence={:?} intent={:?} elapsed_ms={}",
        response.metadata.confidence, response.metadata.intent, response.metadata.elapsed_ms
    );

    Ok(())
}

/// A request identifier good enough for a single-shot demo run; a real
/// deployment generates these from its own request-tracing middleware.
fn uuid_like_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    #[allow(clippy::unwrap_used)]
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("req-{nanos:x}")
}
