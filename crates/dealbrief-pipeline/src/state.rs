//! Submission state and the deltas stages return.
//!
//! Stages never mutate a [`Submission`]. They read it and return a
//! [`SubmissionDelta`]; the engine is the only caller of
//! [`Submission::apply`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dealbrief_core::{BranchKind, SourceDocument};
use dealbrief_retrieval::{CitationMap, ContextSet};
use serde::Serialize;

use crate::error::PipelineError;

/// Caller-supplied inputs of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionInput {
    pub submission_id: String,
    pub seller_url: String,
    pub prospect_url: String,
}

impl SubmissionInput {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] naming the first blank field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (field, value) in [
            ("submission_id", &self.submission_id),
            ("seller_url", &self.seller_url),
            ("prospect_url", &self.prospect_url),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::InvalidInput(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Sections of the prospect report, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Overview,
    Positions,
    News,
    Trends,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Overview,
        SectionKind::Positions,
        SectionKind::News,
        SectionKind::Trends,
    ];

    /// Text used in the combined report when the section was not generated.
    #[must_use]
    pub fn placeholder(self) -> &'static str {
        match self {
            SectionKind::Overview => "## Company Overview\nNo content available.",
            SectionKind::Positions => "## Open Positions\nNo content available.",
            SectionKind::News => "## Recent News\nNo content available.",
            SectionKind::Trends => "## Macro Trends\nNo content available.",
        }
    }
}

/// Everything one side of the comparison has gathered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchState {
    pub discovered_pages: Vec<String>,
    pub pages: Vec<SourceDocument>,
    pub news: Vec<SourceDocument>,
    pub jobs: Vec<SourceDocument>,
    pub macro_trends: Vec<SourceDocument>,
    pub report: Option<String>,
    pub citations: CitationMap,
    pub namespace: String,
}

/// Partial update to a [`BranchState`]. `Some` fields replace.
#[derive(Debug, Clone, Default)]
pub struct BranchDelta {
    pub discovered_pages: Option<Vec<String>>,
    pub pages: Option<Vec<SourceDocument>>,
    pub news: Option<Vec<SourceDocument>>,
    pub jobs: Option<Vec<SourceDocument>>,
    pub macro_trends: Option<Vec<SourceDocument>>,
    pub report: Option<String>,
    pub citations: Option<CitationMap>,
    pub namespace: Option<String>,
}

impl BranchState {
    pub fn merge(&mut self, delta: BranchDelta) {
        if let Some(v) = delta.discovered_pages {
            self.discovered_pages = v;
        }
        if let Some(v) = delta.pages {
            self.pages = v;
        }
        if let Some(v) = delta.news {
            self.news = v;
        }
        if let Some(v) = delta.jobs {
            self.jobs = v;
        }
        if let Some(v) = delta.macro_trends {
            self.macro_trends = v;
        }
        if let Some(v) = delta.report {
            self.report = Some(v);
        }
        if let Some(v) = delta.citations {
            self.citations = v;
        }
        if let Some(v) = delta.namespace {
            self.namespace = v;
        }
    }

    /// Every document the branch holds, pages first.
    #[must_use]
    pub fn all_documents(&self) -> Vec<SourceDocument> {
        self.pages
            .iter()
            .chain(&self.news)
            .chain(&self.jobs)
            .chain(&self.macro_trends)
            .cloned()
            .collect()
    }
}

/// Retrieved prompt contexts shared by the prospect section stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContext {
    pub contexts: ContextSet,
    pub citations: CitationMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Done,
    Error,
}

/// Log line appended by the engine after every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageMessage {
    pub stage: String,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalMetadata {
    pub analysis_date: String,
    pub execution_time_secs: f64,
    pub has_errors: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalReport {
    pub report: String,
    pub metadata: FinalMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: String,
    pub seller_url: String,
    pub prospect_url: String,
    pub created_at: DateTime<Utc>,
    pub seller_name: String,
    pub prospect_name: String,
    pub seller: BranchState,
    pub prospect: BranchState,
    pub report_context: Option<ReportContext>,
    pub sections: BTreeMap<SectionKind, String>,
    pub messages: Vec<StageMessage>,
    pub errors: Vec<String>,
    pub final_report: Option<FinalReport>,
}

impl Submission {
    #[must_use]
    pub fn new(input: SubmissionInput, created_at: DateTime<Utc>) -> Self {
        Self {
            id: input.submission_id,
            seller_url: input.seller_url,
            prospect_url: input.prospect_url,
            created_at,
            seller_name: String::new(),
            prospect_name: String::new(),
            seller: BranchState::default(),
            prospect: BranchState::default(),
            report_context: None,
            sections: BTreeMap::new(),
            messages: Vec::new(),
            errors: Vec::new(),
            final_report: None,
        }
    }

    #[must_use]
    pub fn branch(&self, kind: BranchKind) -> &BranchState {
        match kind {
            BranchKind::Seller => &self.seller,
            BranchKind::Prospect => &self.prospect,
        }
    }

    #[must_use]
    pub fn company_name(&self, kind: BranchKind) -> &str {
        match kind {
            BranchKind::Seller => &self.seller_name,
            BranchKind::Prospect => &self.prospect_name,
        }
    }

    #[must_use]
    pub fn url(&self, kind: BranchKind) -> &str {
        match kind {
            BranchKind::Seller => &self.seller_url,
            BranchKind::Prospect => &self.prospect_url,
        }
    }

    /// Merge a stage's output. Only the engine calls this.
    pub fn apply(&mut self, delta: SubmissionDelta) {
        if let Some(name) = delta.seller_name {
            self.seller_name = name;
        }
        if let Some(name) = delta.prospect_name {
            self.prospect_name = name;
        }
        if let Some(branch) = delta.seller {
            self.seller.merge(branch);
        }
        if let Some(branch) = delta.prospect {
            self.prospect.merge(branch);
        }
        if let Some(context) = delta.report_context {
            self.report_context = Some(context);
        }
        self.sections.extend(delta.sections);
    }
}

/// What a stage produced. Empty by default; stages fill only what they own.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDelta {
    pub seller_name: Option<String>,
    pub prospect_name: Option<String>,
    pub seller: Option<BranchDelta>,
    pub prospect: Option<BranchDelta>,
    pub report_context: Option<ReportContext>,
    pub sections: Vec<(SectionKind, String)>,
}

impl SubmissionDelta {
    /// A delta touching only `kind`'s branch.
    #[must_use]
    pub fn for_branch(kind: BranchKind, delta: BranchDelta) -> Self {
        match kind {
            BranchKind::Seller => Self {
                seller: Some(delta),
                ..Self::default()
            },
            BranchKind::Prospect => Self {
                prospect: Some(delta),
                ..Self::default()
            },
        }
    }

    #[must_use]
    pub fn section(kind: SectionKind, text: String) -> Self {
        Self {
            sections: vec![(kind, text)],
            ..Self::default()
        }
    }
}
