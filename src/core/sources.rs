//! The sources pack: the numbered evidence set handed to the generator.
//!
//! The sources pack builder assigns each retained chunk an internal
//! citation marker (`N1`, `N2`, ...) in the order chunks are packed, and
//! extracts a query-aware snippet for each. The generator is shown only
//! this pack, never the raw retrieval results, so every marker it can
//! possibly emit already corresponds to a real, numbered citation.

use serde::{Deserialize, Serialize};

/// One numbered piece of evidence made available to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Internal marker number, e.g. `3` for the marker text `[N3]`.
    pub marker: u32,
    /// Identifier of the chunk this citation is grounded in.
    pub chunk_id: String,
    /// Identifier of the note the chunk belongs to.
    pub note_id: String,
    /// Human-readable note title, if known.
    pub title: Option<String>,
    /// The query-aware snippet extracted for this citation.
    pub snippet: String,
    /// Deep-link anchor within the note, if the chunk carried one.
    pub anchor: Option<String>,
    /// Character offset range within the note, copied from the source
    /// chunk when tracked upstream.
    pub offsets: Option<(usize, usize)>,
    /// The fused relevance score the chunk had when packed.
    pub score: f64,
}

impl Citation {
    /// Renders this citation's internal marker text, e.g. `[N3]`.
    #[must_use]
    pub fn marker_text(&self) -> String {
        format!("[N{}]", self.marker)
    }
}

/// The ordered, numbered evidence set for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesPack {
    /// Citations in packing order; `citations[i].marker == i as u32 + 1`.
    pub citations: Vec<Citation>,
    /// Number of candidate chunks dropped to respect the context budget,
    /// after the budget cutoff ran.
    pub truncated_count: usize,
}

impl SourcesPack {
    /// Creates an empty sources pack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            citations: Vec::new(),
            truncated_count: 0,
        }
    }

    /// Looks up a citation by its internal marker number.
    #[must_use]
    pub fn get(&self, marker: u32) -> Option<&Citation> {
        self.citations.iter().find(|c| c.marker == marker)
    }

    /// The highest marker number present, or `0` if the pack is empty.
    #[must_use]
    pub fn max_marker(&self) -> u32 {
        self.citations.iter().map(|c| c.marker).max().unwrap_or(0)
    }

    /// Whether the pack offers no evidence at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    /// Number of distinct source notes represented in the pack, used by
    /// the retriever's multi-source boost and by repair-trigger logic.
    #[must_use]
    pub fn distinct_note_count(&self) -> usize {
        let mut notes: Vec<&str> = self.citations.iter().map(|c| c.note_id.as_str()).collect();
        notes.sort_unstable();
        notes.dedup();
        notes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(marker: u32, note_id: &str) -> Citation {
        Citation {
            marker,
            chunk_id: format!("c{marker}"),
            note_id: note_id.to_string(),
            title: None,
            snippet: "snippet text".to_string(),
            anchor: None,
            offsets: None,
            score: 0.5,
        }
    }

    #[test]
    fn marker_text_uses_internal_n_prefix() {
        assert_eq!(citation(3, "n1").marker_text(), "[N3]");
    }

    #[test]
    fn empty_pack_has_zero_max_marker() {
        let pack = SourcesPack::new();
        assert!(pack.is_empty());
        assert_eq!(pack.max_marker(), 0);
    }

    #[test]
    fn distinct_note_count_dedupes() {
        let mut pack = SourcesPack::new();
        pack.citations.push(citation(1, "n1"));
        pack.citations.push(citation(2, "n1"));
        pack.citations.push(citation(3, "n2"));
        assert_eq!(pack.distinct_note_count(), 2);
    }

    #[test]
    fn get_finds_by_marker() {
        let mut pack = SourcesPack::new();
        pack.citations.push(citation(1, "n1"));
        pack.citations.push(citation(2, "n2"));
        assert_eq!(pack.get(2).unwrap().note_id, "n2");
        assert!(pack.get(99).is_none());
    }
}
