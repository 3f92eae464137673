//! Time-hint extraction: a small regex table mapping common relative-time
//! phrases to a lookback window in days.
//!
//! All hints resolve to [`TimeHint::Relative`] — the analyzer has no
//! notion of "now", so it cannot produce an absolute range deterministically;
//! the retriever resolves the relative window against the request's clock.
//! [`TimeHint::Absolute`] exists for note-filter callers that pass an
//! explicit date range directly, bypassing this parser.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::TimeHint;

struct Rule {
    pattern: &'static str,
    days: fn(&regex::Captures<'_>) -> u32,
}

fn const_days(days: u32) -> fn(&regex::Captures<'_>) -> u32 {
    match days {
        1 => |_| 1,
        2 => |_| 2,
        7 => |_| 7,
        14 => |_| 14,
        30 => |_| 30,
        60 => |_| 60,
        _ => |_| 90,
    }
}

fn captured_number(captures: &regex::Captures<'_>, unit_days: u32) -> u32 {
    captures
        .get(1)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map_or(unit_days, |n| n.saturating_mul(unit_days).max(1))
}

#[allow(clippy::unwrap_used)]
static RULES: LazyLock<Vec<(Regex, Rule)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)\btoday\b").unwrap(),
            Rule {
                pattern: "today",
                days: const_days(1),
            },
        ),
        (
            Regex::new(r"(?i)\byesterday\b").unwrap(),
            Rule {
                pattern: "yesterday",
                days: const_days(2),
            },
        ),
        (
            Regex::new(r"(?i)\blast\s+week\b").unwrap(),
            Rule {
                pattern: "last week",
                days: const_days(14),
            },
        ),
        (
            Regex::new(r"(?i)\bthis\s+week\b").unwrap(),
            Rule {
                pattern: "this week",
                days: const_days(7),
            },
        ),
        (
            Regex::new(r"(?i)\blast\s+month\b").unwrap(),
            Rule {
                pattern: "last month",
                days: const_days(60),
            },
        ),
        (
            Regex::new(r"(?i)\bthis\s+month\b").unwrap(),
            Rule {
                pattern: "this month",
                days: const_days(30),
            },
        ),
        (
            Regex::new(r"(?i)\bin\s+(\d+)\s+week[s]?\b").unwrap(),
            Rule {
                pattern: "in N weeks",
                days: |c| captured_number(c, 7),
            },
        ),
        (
            Regex::new(r"(?i)\bin\s+(\d+)\s+day[s]?\b").unwrap(),
            Rule {
                pattern: "in N days",
                days: |c| captured_number(c, 1),
            },
        ),
        (
            Regex::new(r"(?i)\bin\s+(\d+)\s+hour[s]?\b").unwrap(),
            Rule {
                pattern: "in N hours",
                days: |_| 1,
            },
        ),
    ]
});

/// Finds the first matching time-hint rule in `text`, if any.
#[must_use]
pub fn extract_time_hint(text: &str) -> Option<TimeHint> {
    RULES.iter().find_map(|(regex, rule)| {
        regex.captures(text).map(|captures| {
            let _ = rule.pattern;
            TimeHint::Relative((rule.days)(&captures))
        })
    })
}
