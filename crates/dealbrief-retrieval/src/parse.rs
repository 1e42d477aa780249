//! Typed parsing of list-shaped completion output.
//!
//! Completion text is parsed through a fallback chain and every result is
//! tagged with how it was obtained, so callers can tell a clean JSON answer
//! from a best-effort scrape.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+(.+?)\s*$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// A JSON array of strings.
    Structured,
    /// Numbered or bulleted lines.
    BestEffort,
    /// Comma or line split of whatever came back.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parsed {
    pub items: Vec<String>,
    pub confidence: Confidence,
}

/// Remove a surrounding markdown code fence (```` ```lang ... ``` ````).
#[must_use]
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Parse a list from completion output: JSON array, then list lines, then
/// a raw split.
#[must_use]
pub fn parse_list(text: &str) -> Parsed {
    let cleaned = strip_code_fences(text);

    if let Ok(items) = serde_json::from_str::<Vec<String>>(&cleaned) {
        return Parsed {
            items: items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            confidence: Confidence::Structured,
        };
    }

    let listed: Vec<String> = cleaned
        .lines()
        .filter_map(|line| LIST_ITEM.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    if !listed.is_empty() {
        return Parsed {
            items: listed,
            confidence: Confidence::BestEffort,
        };
    }

    let separator = if cleaned.contains('\n') { '\n' } else { ',' };
    Parsed {
        items: cleaned
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        confidence: Confidence::Raw,
    }
}
