use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Webpage,
    News,
    Job,
    MacroTrend,
}

impl DocumentKind {
    /// News and job listings are seeded into every retrieval unconditionally.
    #[must_use]
    pub fn is_time_sensitive(self) -> bool {
        matches!(self, DocumentKind::News | DocumentKind::Job)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Webpage => write!(f, "webpage"),
            DocumentKind::News => write!(f, "news"),
            DocumentKind::Job => write!(f, "job"),
            DocumentKind::MacroTrend => write!(f, "macro_trend"),
        }
    }
}

/// Which side of the comparison a piece of state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Seller,
    Prospect,
}

impl std::fmt::Display for BranchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchKind::Seller => write!(f, "seller"),
            BranchKind::Prospect => write!(f, "prospect"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Origin URL; the join key for deduplication and citation numbering.
    pub url: String,
    pub title: String,
    pub published_date: Option<String>,
    pub kind: DocumentKind,
}

/// A fetched piece of source content. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    pub meta: DocumentMeta,
}

impl SourceDocument {
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        kind: DocumentKind,
    ) -> Self {
        Self {
            content: content.into(),
            meta: DocumentMeta {
                url: url.into(),
                title: title.into(),
                published_date: None,
                kind,
            },
        }
    }

    #[must_use]
    pub fn with_published_date(mut self, date: impl Into<String>) -> Self {
        self.meta.published_date = Some(date.into());
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.meta.url
    }

    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.meta.kind
    }
}

/// One step of user-visible progress for a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub idx: usize,
    pub message: String,
    pub details: String,
    pub output: Option<String>,
    pub total_steps: usize,
}
