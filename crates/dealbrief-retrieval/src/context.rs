//! Prompt context assembly and token-budget truncation.

use std::fmt::Write as _;
use std::sync::LazyLock;

use dealbrief_core::{DocumentKind, SourceDocument};
use regex::Regex;
use serde::Serialize;

use crate::citations::CitationMap;

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Citation: \d+\]").expect("valid regex"));

/// Context strings handed to report templates. Every fragment ends with a
/// `[Citation: n]` marker pointing into the branch's [`CitationMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextSet {
    pub combined: String,
    pub webpage: String,
    pub news: String,
    pub job: String,
    pub macro_trend: String,
    /// `[n]. [title](url) - url` lines, ascending by index.
    pub citations: String,
    /// `[n] title (kind)` lines for the system message.
    pub sources_overview: String,
    pub citation_count: usize,
}

fn fragment(doc: &SourceDocument, citations: &CitationMap) -> Option<String> {
    let index = citations.get(doc.url())?.index;
    Some(format!("{} [Citation: {index}]", doc.content.trim()))
}

fn join_kind(
    docs: &[SourceDocument],
    citations: &CitationMap,
    kind: Option<DocumentKind>,
) -> String {
    docs.iter()
        .filter(|d| kind.is_none_or(|k| d.kind() == k))
        .filter_map(|d| fragment(d, citations))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build per-kind contexts and citation listings from collected documents.
///
/// Documents whose URL has no citation entry are left out.
#[must_use]
pub fn build_contexts(docs: &[SourceDocument], citations: &CitationMap) -> ContextSet {
    let mut listing = Vec::with_capacity(citations.len());
    let mut overview = Vec::with_capacity(citations.len());
    for entry in citations.entries() {
        let mut line = format!(
            "[{}]. [{}]({}) - {}",
            entry.index, entry.title, entry.url, entry.url
        );
        if entry.kind == DocumentKind::News {
            let _ = write!(
                line,
                " - News article from {}",
                entry.published_date.as_deref().unwrap_or("Unknown date")
            );
        }
        listing.push(line);
        overview.push(format!("[{}] {} ({})", entry.index, entry.title, entry.kind));
    }

    ContextSet {
        combined: join_kind(docs, citations, None),
        webpage: join_kind(docs, citations, Some(DocumentKind::Webpage)),
        news: join_kind(docs, citations, Some(DocumentKind::News)),
        job: join_kind(docs, citations, Some(DocumentKind::Job)),
        macro_trend: join_kind(docs, citations, Some(DocumentKind::MacroTrend)),
        citations: listing.join("\n"),
        sources_overview: overview.join("\n"),
        citation_count: citations.len(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TruncationOutcome {
    WithinBudget,
    /// The prompt was over budget; contexts were cut to `ratio` of their
    /// sentences.
    Truncated { estimated_tokens: usize, ratio: f64 },
}

/// Split after `.`, `?` or `!` followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '?' | '!') {
            if let Some(&(j, next)) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = text[start..=i].trim();
                    if !sentence.is_empty() {
                        out.push(sentence);
                    }
                    start = j;
                }
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Keep the first `ratio` share of `text`'s sentences. When the cut drops a
/// citation marker, the last dropped marker is re-attached at the end.
pub(crate) fn truncate_text(text: &str, ratio: f64) -> String {
    let all = sentences(text);
    if all.is_empty() {
        return String::new();
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let keep = ((all.len() as f64) * ratio.clamp(0.0, 1.0)).floor() as usize;
    if keep >= all.len() {
        return all.join(" ");
    }

    let mut truncated = all[..keep].join(" ");
    let kept_ends_with_marker = all[..keep]
        .last()
        .is_some_and(|s| CITATION_MARKER.find_iter(s).last().is_some_and(|m| m.end() == s.len()));

    if !kept_ends_with_marker {
        let dropped_marker = all[keep..]
            .iter()
            .rev()
            .find_map(|s| CITATION_MARKER.find_iter(s).last());
        if let Some(marker) = dropped_marker {
            if !truncated.is_empty() {
                truncated.push(' ');
            }
            truncated.push_str(marker.as_str());
        }
    }
    truncated
}

/// Shrink every context proportionally when `estimated_tokens` exceeds
/// `max_tokens`. Citation listings are never cut.
pub fn truncate_contexts(
    contexts: &mut ContextSet,
    estimated_tokens: usize,
    max_tokens: usize,
) -> TruncationOutcome {
    if estimated_tokens <= max_tokens || estimated_tokens == 0 {
        return TruncationOutcome::WithinBudget;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = max_tokens as f64 / estimated_tokens as f64;
    tracing::warn!(
        estimated_tokens,
        max_tokens,
        ratio,
        "prompt over token budget, truncating contexts"
    );

    for field in [
        &mut contexts.combined,
        &mut contexts.webpage,
        &mut contexts.news,
        &mut contexts.job,
        &mut contexts.macro_trend,
    ] {
        *field = truncate_text(field, ratio);
    }
    TruncationOutcome::Truncated {
        estimated_tokens,
        ratio,
    }
}
