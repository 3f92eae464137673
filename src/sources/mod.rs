//! Sources Pack Builder: turns retrieval output into the numbered,
//! immutable evidence set the generator is shown.

pub mod snippet;

use crate::config::PipelineConfig;
use crate::core::{Citation, ScoredChunk, SourcesPack};

/// Builds a [`SourcesPack`] from retrieval output, in ranked order.
///
/// Assigns markers `N1, N2, ...` in the order `scored_chunks` is given
/// (retrieval already sorted it best-first), extracts a query-aware
/// snippet per chunk, and copies through offsets/anchor when present.
/// Once built, the pack is never mutated — the validator and
/// post-processor only ever drop or renumber markers, never add chunks.
#[must_use]
pub fn build_sources_pack(
    scored_chunks: &[ScoredChunk],
    query_keywords: &[String],
    config: &PipelineConfig,
    titles: &dyn Fn(&str) -> Option<String>,
) -> SourcesPack {
    let citations = scored_chunks
        .iter()
        .enumerate()
        .map(|(i, sc)| {
            let snippet = snippet::extract_snippet(&sc.chunk.text, query_keywords, config.snippet_char_cap);
            Citation {
                #[allow(clippy::cast_possible_truncation)]
                marker: (i + 1) as u32,
                chunk_id: sc.chunk.id.clone(),
                note_id: sc.chunk.note_id.clone(),
                title: titles(&sc.chunk.note_id),
                snippet,
                anchor: sc.chunk.anchor.clone(),
                offsets: sc.chunk.offsets,
                score: sc.score,
            }
        })
        .collect();

    SourcesPack {
        citations,
        truncated_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Chunk;

    fn scored(id: &str, note_id: &str, text: &str, score: f64) -> ScoredChunk {
        ScoredChunk::new(Chunk::new(id, note_id, "tenant-a", text, 0, 0), score)
    }

    #[test]
    fn assigns_markers_in_given_order() {
        let config = PipelineConfig::default();
        let chunks = vec![
            scored("c1", "n1", "We chose Postgres.", 0.9),
            scored("c2", "n2", "It scales well.", 0.5),
        ];
        let pack = build_sources_pack(&chunks, &["postgres".to_string()], &config, &|_| None);
        assert_eq!(pack.citations.len(), 2);
        assert_eq!(pack.citations[0].marker, 1);
        assert_eq!(pack.citations[1].marker, 2);
        assert_eq!(pack.citations[0].chunk_id, "c1");
    }

    #[test]
    fn copies_through_anchor_and_offsets_when_present() {
        let config = PipelineConfig::default();
        let chunk = Chunk::new("c1", "n1", "tenant-a", "text here.", 0, 0)
            .with_anchor(Some((0, 9)), Some("heading-1".to_string()));
        let chunks = vec![ScoredChunk::new(chunk, 0.8)];
        let pack = build_sources_pack(&chunks, &[], &config, &|_| None);
        assert_eq!(pack.citations[0].anchor, Some("heading-1".to_string()));
    }

    #[test]
    fn looks_up_titles_by_note_id() {
        let config = PipelineConfig::default();
        let chunks = vec![scored("c1", "n1", "text here.", 0.8)];
        let pack = build_sources_pack(&chunks, &[], &config, &|note_id| {
            (note_id == "n1").then(|| "My Note".to_string())
        });
        assert_eq!(pack.citations[0].title, Some("My Note".to_string()));
    }

    #[test]
    fn empty_input_yields_empty_pack() {
        let config = PipelineConfig::default();
        let pack = build_sources_pack(&[], &[], &config, &|_| None);
        assert!(pack.is_empty());
    }
}
