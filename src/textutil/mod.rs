//! Shared text utilities: keyword-set overlap and sentence splitting,
//! used by retrieval scoring, citation validation, snippet extraction,
//! and confidence scoring alike so all four agree on what a "sentence"
//! or an "overlap score" is.

pub mod overlap;
pub mod sentence;

pub use overlap::{keyword_set, min_based_overlap, text_overlap};
pub use sentence::{SUBSTANTIAL_SENTENCE_MIN_LEN, is_substantial, split_sentences};
