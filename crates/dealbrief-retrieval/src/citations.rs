use std::collections::HashMap;

use dealbrief_core::{DocumentKind, DocumentMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationEntry {
    pub index: usize,
    pub url: String,
    pub title: String,
    pub kind: DocumentKind,
    pub published_date: Option<String>,
}

/// Origin URL to citation index for one branch.
///
/// Indices start at 1, are handed out in first-seen order and never change
/// or get reused. Renumbering for presentation happens on a copy of the
/// report text, never here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationMap {
    entries: Vec<CitationEntry>,
    #[serde(skip)]
    by_url: HashMap<String, usize>,
}

impl CitationMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `meta.url`, assigning the next one if the URL is new.
    pub fn assign(&mut self, meta: &DocumentMeta) -> usize {
        if let Some(index) = self.lookup(&meta.url) {
            return index;
        }
        let index = self.entries.len() + 1;
        self.entries.push(CitationEntry {
            index,
            url: meta.url.clone(),
            title: if meta.title.trim().is_empty() {
                default_title(meta.kind).to_string()
            } else {
                meta.title.clone()
            },
            kind: meta.kind,
            published_date: meta.published_date.clone(),
        });
        self.by_url.insert(meta.url.clone(), index);
        index
    }

    // `by_url` is not serialized; fall back to a scan after deserialization.
    fn lookup(&self, url: &str) -> Option<usize> {
        self.by_url.get(url).copied().or_else(|| {
            self.entries
                .iter()
                .find(|e| e.url == url)
                .map(|e| e.index)
        })
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&CitationEntry> {
        self.lookup(url).and_then(|i| self.by_index(i))
    }

    #[must_use]
    pub fn by_index(&self, index: usize) -> Option<&CitationEntry> {
        index.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    #[must_use]
    pub fn entries(&self) -> &[CitationEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for CitationMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for CitationMap {}

fn default_title(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Webpage => "Webpage",
        DocumentKind::News => "News Article",
        DocumentKind::Job => "Job Listing",
        DocumentKind::MacroTrend => "Macro Trend",
    }
}
