//! Query analysis results.
//!
//! The analyzer stage turns a raw user query into a [`QueryAnalysis`]:
//! the detected [`Intent`], extracted keywords, an optional [`TimeHint`],
//! and a recommended candidate count for the retriever to request per
//! source.

use serde::{Deserialize, Serialize};

/// The coarse intent a query analyzer assigns to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// The user wants a condensed overview of a topic or time range.
    Summarize,
    /// The user wants an enumeration of items.
    List,
    /// The user is asking what was decided about something.
    Decision,
    /// The user wants open action items or follow-ups.
    ActionItem,
    /// The user wants matching passages without a specific question shape.
    Search,
    /// The user is asking a direct factual question.
    Question,
}

impl Intent {
    /// Whether this intent implies the retriever should favor recency
    /// over topical relevance (decisions and action items lean recent).
    #[must_use]
    pub const fn favors_recency(self) -> bool {
        matches!(self, Self::Decision | Self::ActionItem)
    }
}

/// A detected relative or absolute time constraint on the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimeHint {
    /// A relative window expressed in days before the request time, e.g.
    /// "last week" resolves to `Relative(7)`.
    Relative(u32),
    /// An absolute Unix timestamp range, `(start, end)` inclusive.
    Absolute(i64, i64),
}

/// The result of analyzing a raw query before retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// The original, unmodified query text.
    pub raw_query: String,
    /// Detected intent.
    pub intent: Intent,
    /// Extracted keywords, stop words removed, normalized to lowercase.
    pub keywords: Vec<String>,
    /// A detected time constraint, if the query referenced one.
    pub time_hint: Option<TimeHint>,
    /// Recommended number of candidates to request from each retrieval
    /// source, adapted to query complexity.
    pub candidate_count: usize,
}

impl QueryAnalysis {
    /// Creates an analysis result with search intent and no time hint,
    /// the conservative default when the analyzer classifier declines.
    #[must_use]
    pub fn fallback(raw_query: impl Into<String>, candidate_count: usize) -> Self {
        Self {
            raw_query: raw_query.into(),
            intent: Intent::Search,
            keywords: Vec::new(),
            time_hint: None,
            candidate_count,
        }
    }

    /// Whether the query carries no extracted keywords at all, in which
    /// case lexical search has nothing to match against.
    #[must_use]
    pub fn has_keywords(&self) -> bool {
        !self.keywords.is_empty()
    }
}
