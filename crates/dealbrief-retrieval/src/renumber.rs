//! Dense renumbering of citation markers in a generated report.
//!
//! Reports cite sources by their branch citation index, which is sparse by
//! the time a report is written (only some sources get cited). The rewrite
//! numbers the cited sources `1..N` by first appearance in the body, links
//! every marker to its source URL and regenerates the `## Citations`
//! section to list exactly the cited sources.
//!
//! Numbers follow reading order, not the ascending order of the old
//! indices: a report citing `[5]` and then `[2]` becomes `[1]` and `[2]`,
//! with `[5]`'s source listed first.
//!
//! The rewrite is a pure function of the text and the map. Already-linked
//! markers (`[n](url)`) resolve through their URL, so running it on its own
//! output changes nothing.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::citations::CitationMap;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\](?:\(([^)\s]+)\))?").expect("valid regex"));

static CITATIONS_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^## Citations[ \t]*$").expect("valid regex"));

const SECTION_HEADING: &str = "## Citations";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenumberOutcome {
    /// Distinct sources cited in the body.
    pub used: usize,
    pub section_found: bool,
    /// Bare marker numbers with no entry in the citation map, left as-is.
    pub unresolved: Vec<usize>,
}

impl RenumberOutcome {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.section_found && self.unresolved.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbered {
    pub text: String,
    pub outcome: RenumberOutcome,
}

/// Byte range of the citations section: heading line up to the next `## `
/// heading or the end of the text.
fn section_range(text: &str) -> Option<Range<usize>> {
    let heading = CITATIONS_HEADING.find(text)?;
    let end = text[heading.end()..]
        .find("\n## ")
        .map_or(text.len(), |offset| heading.end() + offset + 1);
    Some(heading.start()..end)
}

/// Source URL a marker points at, if it is a citation marker at all.
fn resolve(caps: &Captures<'_>, citations: &CitationMap) -> Option<String> {
    match caps.get(2) {
        Some(url) => citations.get(url.as_str()).map(|e| e.url.clone()),
        None => caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|n| citations.by_index(n))
            .map(|e| e.url.clone()),
    }
}

/// Compact citation numbering in `text` to `1..N`.
///
/// Never fails: markers without a mapping are left unchanged, and a missing
/// `## Citations` section only means no list is regenerated.
#[must_use]
pub fn renumber_citations(text: &str, citations: &CitationMap) -> Renumbered {
    let section = section_range(text);
    let (before, after) = match &section {
        Some(range) => (&text[..range.start], &text[range.end..]),
        None => (text, ""),
    };

    let mut order: Vec<String> = Vec::new();
    let mut numbers: HashMap<String, usize> = HashMap::new();
    let mut unresolved = BTreeSet::new();
    for part in [before, after] {
        for caps in MARKER.captures_iter(part) {
            match resolve(&caps, citations) {
                Some(url) => {
                    if !numbers.contains_key(&url) {
                        numbers.insert(url.clone(), order.len() + 1);
                        order.push(url);
                    }
                }
                None if caps.get(2).is_none() => {
                    if let Ok(n) = caps[1].parse::<usize>() {
                        unresolved.insert(n);
                    }
                }
                None => {}
            }
        }
    }

    let rewrite = |part: &str| -> String {
        MARKER
            .replace_all(part, |caps: &Captures<'_>| {
                resolve(caps, citations)
                    .and_then(|url| numbers.get(&url).map(|n| format!("[{n}]({url})")))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    };

    let mut out = rewrite(before);
    if section.is_some() {
        out.push_str(SECTION_HEADING);
        out.push('\n');
        for (i, url) in order.iter().enumerate() {
            let title = citations.get(url).map_or(url.as_str(), |e| e.title.as_str());
            let _ = writeln!(out, "[{}]. {title} — {url}", i + 1);
        }
        if !after.is_empty() {
            out.push('\n');
            out.push_str(&rewrite(after));
        }
    } else {
        tracing::warn!("report has no citations section, markers renumbered without a list");
    }

    let unresolved: Vec<usize> = unresolved.into_iter().collect();
    if !unresolved.is_empty() {
        tracing::warn!(?unresolved, "citation markers without a source mapping left unchanged");
    }

    Renumbered {
        text: out,
        outcome: RenumberOutcome {
            used: order.len(),
            section_found: section.is_some(),
            unresolved,
        },
    }
}

#[cfg(test)]
#[path = "renumber_test.rs"]
mod tests;
