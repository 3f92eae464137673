//! The validated, post-processed answer returned to the caller.

use serde::{Deserialize, Serialize};

/// Legacy four-level confidence exposed at the external API boundary.
///
/// `None` is reserved for answers with zero surviving citations or that
/// explicitly acknowledge uncertainty; it is never assigned merely because
/// the enhanced score is low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Strong citation support and coherent answer.
    High,
    /// Adequate support with some gaps.
    Medium,
    /// Weak support; the answer should be treated skeptically.
    Low,
    /// No usable citation support, or the answer admits it doesn't know.
    None,
}

/// Five-level confidence computed internally from four weighted sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancedConfidence {
    /// Composite score `>= 0.85`.
    VeryHigh,
    /// Composite score `>= 0.70`.
    High,
    /// Composite score `>= 0.50`.
    Medium,
    /// Composite score `>= 0.30`.
    Low,
    /// Composite score below `0.30`.
    VeryLow,
}

impl EnhancedConfidence {
    /// Classifies a composite score in `[0, 1]` into a confidence level.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            Self::VeryHigh
        } else if score >= 0.70 {
            Self::High
        } else if score >= 0.50 {
            Self::Medium
        } else if score >= 0.30 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    /// Maps this enhanced confidence down to the legacy four-level scheme.
    ///
    /// `None` is never produced here; the caller that owns citation-count
    /// and uncertainty-acknowledgement context downgrades to `None`
    /// separately when those conditions hold.
    #[must_use]
    pub const fn to_legacy(self) -> ConfidenceLevel {
        match self {
            Self::VeryHigh | Self::High => ConfidenceLevel::High,
            Self::Medium => ConfidenceLevel::Medium,
            Self::Low | Self::VeryLow => ConfidenceLevel::Low,
        }
    }
}

/// The final answer returned from the pipeline, after citation validation,
/// optional repair, post-processing, and confidence scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedAnswer {
    /// The answer text with renumbered external citation markers
    /// (`[1]`, `[2]`, ...), dangling markers stripped.
    pub text: String,
    /// External marker numbers actually present in `text`, in first-use
    /// order.
    pub citation_markers: Vec<u32>,
    /// Fraction of `>15`-character sentences carrying at least one valid
    /// citation marker, computed before renumbering.
    pub citation_coverage: f64,
    /// `true` iff no dangling markers remained in the final text.
    pub contract_compliant: bool,
    /// `true` if the repair pass ran and its output was accepted.
    pub was_repaired: bool,
    /// Five-level internal confidence.
    pub enhanced_confidence: EnhancedConfidence,
    /// Four-level confidence exposed externally.
    pub confidence: ConfidenceLevel,
}

impl ValidatedAnswer {
    /// Whether the answer carries any surviving citation at all.
    #[must_use]
    pub fn has_citations(&self) -> bool {
        !self.citation_markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_boundaries_classify_correctly() {
        assert_eq!(EnhancedConfidence::from_score(0.85), EnhancedConfidence::VeryHigh);
        assert_eq!(EnhancedConfidence::from_score(0.84), EnhancedConfidence::High);
        assert_eq!(EnhancedConfidence::from_score(0.70), EnhancedConfidence::High);
        assert_eq!(EnhancedConfidence::from_score(0.50), EnhancedConfidence::Medium);
        assert_eq!(EnhancedConfidence::from_score(0.30), EnhancedConfidence::Low);
        assert_eq!(EnhancedConfidence::from_score(0.29), EnhancedConfidence::VeryLow);
    }

    #[test]
    fn legacy_mapping_collapses_five_to_three_nonzero_levels() {
        assert_eq!(EnhancedConfidence::VeryHigh.to_legacy(), ConfidenceLevel::High);
        assert_eq!(EnhancedConfidence::High.to_legacy(), ConfidenceLevel::High);
        assert_eq!(EnhancedConfidence::Medium.to_legacy(), ConfidenceLevel::Medium);
        assert_eq!(EnhancedConfidence::Low.to_legacy(), ConfidenceLevel::Low);
        assert_eq!(EnhancedConfidence::VeryLow.to_legacy(), ConfidenceLevel::Low);
    }
}
