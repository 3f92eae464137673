//! Prompt Builder: turns a query, its detected intent, and a Sources Pack
//! into a system instruction and user prompt for the generator.
//!
//! Three tiers share the same citation-grammar guarantees so the
//! validator can operate regardless of which tier produced the answer:
//! every factual claim is followed by one or more `[N<integer>]`
//! markers, markers may be grouped (`[N1][N3]`), and uncertainty is
//! always expressed in prose rather than by silently dropping a claim.

use std::fmt::Write as _;

use crate::core::{Intent, SourcesPack};

/// Which prompt-construction style to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptTier {
    /// A single combined instruction string, no structural sectioning.
    Legacy,
    /// System instruction and user prompt kept separate, with explicit
    /// XML-ish sectioning of sources.
    #[default]
    StructuredV2,
    /// Adds an explicit reasoning-before-answering directive and a
    /// stricter refusal-to-guess instruction, for backends that benefit
    /// from an agentic framing.
    Agentic,
}

const GRAMMAR_RULES: &str = "Every factual claim must be followed by one or more citation \
markers of the form [N<integer>], where the integer refers to a source listed below. \
Markers may be grouped, e.g. [N1][N3]. Never omit a citation silently: if the sources do \
not answer part of the question, say so in plain language instead of guessing.";

fn intent_directive(intent: Intent) -> &'static str {
    match intent {
        Intent::Summarize => "Summarize the sources concisely; do not introduce new claims.",
        Intent::List => "Format the answer as a bulleted or numbered list, one item per claim.",
        Intent::Decision => "Lead with the decision itself, then the supporting reasoning.",
        Intent::ActionItem => "List concrete action items; prefer imperative phrasing.",
        Intent::Question | Intent::Search => "Answer directly and concisely.",
    }
}

fn relevance_stars(score: f64) -> String {
    let filled = ((score.clamp(0.0, 1.0)) * 5.0).round() as u32;
    "\u{2605}".repeat(filled as usize) + &"\u{2606}".repeat(5 - filled as usize)
}

fn render_sources(pack: &SourcesPack, with_stars: bool) -> String {
    let mut out = String::new();
    for citation in &pack.citations {
        if with_stars {
            let _ = writeln!(
                out,
                "[N{}] {} {}",
                citation.marker,
                relevance_stars(citation.score),
                citation.title.as_deref().unwrap_or("(untitled)")
            );
        } else {
            let _ = writeln!(
                out,
                "[N{}] {}",
                citation.marker,
                citation.title.as_deref().unwrap_or("(untitled)")
            );
        }
        let _ = writeln!(out, "{}\n", citation.snippet);
    }
    out
}

/// Builds the `(system_instruction, user_prompt)` pair for one request.
#[must_use]
pub fn build_prompt(
    query: &str,
    pack: &SourcesPack,
    intent: Intent,
    tier: PromptTier,
) -> (String, String) {
    match tier {
        PromptTier::Legacy => build_legacy(query, pack, intent),
        PromptTier::StructuredV2 => build_structured_v2(query, pack, intent),
        PromptTier::Agentic => build_agentic(query, pack, intent),
    }
}

fn build_legacy(query: &str, pack: &SourcesPack, intent: Intent) -> (String, String) {
    let system = format!(
        "You are a notes assistant. {GRAMMAR_RULES} {}",
        intent_directive(intent)
    );
    let user = format!(
        "Question: {query}\n\nSources:\n{}",
        render_sources(pack, false)
    );
    (system, user)
}

fn build_structured_v2(query: &str, pack: &SourcesPack, intent: Intent) -> (String, String) {
    let system = format!(
        "<role>You are a notes assistant answering from a fixed set of retrieved sources.</role>\n\
         <grammar>{GRAMMAR_RULES}</grammar>\n\
         <intent-directive>{}</intent-directive>",
        intent_directive(intent)
    );
    let user = format!(
        "<query>{query}</query>\n\n<sources>\n{}</sources>",
        render_sources(pack, true)
    );
    (system, user)
}

fn build_agentic(query: &str, pack: &SourcesPack, intent: Intent) -> (String, String) {
    let system = format!(
        "<role>You are a notes assistant operating with a fixed, closed set of sources. You \
         cannot search for more information.</role>\n\
         <grammar>{GRAMMAR_RULES}</grammar>\n\
         <intent-directive>{}</intent-directive>\n\
         <reasoning>Before answering, silently check each claim against the sources below. If \
         no source supports a part of the question, state that plainly rather than filling the \
         gap.</reasoning>",
        intent_directive(intent)
    );
    let user = format!(
        "<query>{query}</query>\n\n<sources>\n{}</sources>\n\nAnswer the query now.",
        render_sources(pack, true)
    );
    (system, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Citation;

    fn sample_pack() -> SourcesPack {
        SourcesPack {
            citations: vec![
                Citation {
                    marker: 1,
                    chunk_id: "c1".to_string(),
                    note_id: "n1".to_string(),
                    title: Some("Meeting Notes".to_string()),
                    snippet: "We chose Postgres.".to_string(),
                    anchor: None,
                    offsets: None,
                    score: 0.9,
                },
            ],
            truncated_count: 0,
        }
    }

    #[test]
    fn legacy_tier_embeds_grammar_and_sources() {
        let (system, user) = build_prompt("what database?", &sample_pack(), Intent::Question, PromptTier::Legacy);
        assert!(system.contains("[N<integer>]"));
        assert!(user.contains("[N1]"));
        assert!(user.contains("Postgres"));
    }

    #[test]
    fn structured_v2_separates_system_and_sections() {
        let (system, user) = build_prompt("what database?", &sample_pack(), Intent::Decision, PromptTier::StructuredV2);
        assert!(system.contains("<grammar>"));
        assert!(system.to_lowercase().contains("decision"));
        assert!(user.contains("<sources>"));
    }

    #[test]
    fn agentic_tier_adds_reasoning_directive() {
        let (system, _user) = build_prompt("what database?", &sample_pack(), Intent::Question, PromptTier::Agentic);
        assert!(system.contains("<reasoning>"));
    }

    #[test]
    fn list_intent_requests_bulleted_format() {
        let (system, _user) = build_prompt("items?", &sample_pack(), Intent::List, PromptTier::Legacy);
        assert!(system.to_lowercase().contains("bulleted") || system.to_lowercase().contains("numbered"));
    }

    #[test]
    fn relevance_stars_scale_with_score() {
        assert_eq!(relevance_stars(1.0), "\u{2605}\u{2605}\u{2605}\u{2605}\u{2605}");
        assert_eq!(relevance_stars(0.0), "\u{2606}\u{2606}\u{2606}\u{2606}\u{2606}");
    }
}
