//! The report stages and the table wiring them into a chain.

mod combine;
mod discovery;
mod fetch;
mod initialize;
mod report;
mod sections;
mod signals;

use async_trait::async_trait;
use dealbrief_core::BranchKind;
use dealbrief_retrieval::{estimate_tokens, truncate_contexts, ChatMessage, ContextSet, TruncationOutcome};

pub use combine::Combine;
pub use discovery::{Discovery, MAX_PAGES};
pub use fetch::Fetch;
pub use initialize::Initialize;
pub use report::{ProspectReportAssembly, SellerReport};
pub use sections::SectionStage;
pub use signals::{Jobs, MacroTrends, News};

use crate::error::{PipelineError, StageError};
use crate::stage::{Stage, StageContext, StageTable};
use crate::state::{SectionKind, Submission, SubmissionDelta};

pub const INITIALIZE: &str = "initialize";
pub const SELLER_DISCOVERY: &str = "seller-discovery";
pub const SELLER_FETCH: &str = "seller-fetch";
pub const SELLER_REPORT: &str = "seller-report";
pub const PROSPECT_DISCOVERY: &str = "prospect-discovery";
pub const PROSPECT_FETCH: &str = "prospect-fetch";
pub const PROSPECT_NEWS: &str = "prospect-news";
pub const PROSPECT_JOBS: &str = "prospect-jobs";
pub const PROSPECT_MACRO_TRENDS: &str = "prospect-macro-trends";
pub const PROSPECT_REPORT_ASSEMBLY: &str = "prospect-report-assembly";
pub const OVERVIEW: &str = "overview";
pub const POSITIONS: &str = "positions";
pub const NEWS_SECTION: &str = "news-section";
pub const TRENDS_SECTION: &str = "trends-section";
pub const COMBINE: &str = "combine";
pub const END: &str = "end";

/// Terminal no-op.
pub struct End;

#[async_trait]
impl Stage for End {
    fn name(&self) -> &'static str {
        END
    }

    async fn execute(
        &self,
        _ctx: &StageContext,
        _submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        Ok(SubmissionDelta::default())
    }
}

/// The full seller-then-prospect chain.
///
/// # Errors
///
/// Returns [`PipelineError::DuplicateStage`] only if two stages share a
/// name, which the fixed table never does.
pub fn default_stage_table() -> Result<StageTable, PipelineError> {
    let mut table = StageTable::new();
    table
        .register(Initialize, &[])?
        .register(Discovery::new(BranchKind::Seller), &[INITIALIZE])?
        .register(Fetch::new(BranchKind::Seller), &[SELLER_DISCOVERY])?
        .register(SellerReport, &[SELLER_FETCH])?
        .register(Discovery::new(BranchKind::Prospect), &[SELLER_REPORT])?
        .register(Fetch::new(BranchKind::Prospect), &[PROSPECT_DISCOVERY])?
        .register(News, &[PROSPECT_FETCH])?
        .register(Jobs, &[PROSPECT_NEWS])?
        .register(MacroTrends, &[PROSPECT_JOBS])?
        .register(ProspectReportAssembly, &[PROSPECT_MACRO_TRENDS])?
        .register(SectionStage::new(SectionKind::Overview), &[PROSPECT_REPORT_ASSEMBLY])?
        .register(SectionStage::new(SectionKind::Positions), &[OVERVIEW])?
        .register(SectionStage::new(SectionKind::News), &[POSITIONS])?
        .register(SectionStage::new(SectionKind::Trends), &[NEWS_SECTION])?
        .register(Combine, &[TRENDS_SECTION])?
        .register(End, &[COMBINE])?;
    Ok(table)
}

/// Build a prompt from `contexts`, cutting the contexts proportionally when
/// the prompt would exceed `max_tokens`.
pub(crate) fn budgeted_prompt<F>(
    contexts: &mut ContextSet,
    max_tokens: usize,
    build: F,
) -> Vec<ChatMessage>
where
    F: Fn(&ContextSet) -> Vec<ChatMessage>,
{
    let messages = build(contexts);
    let estimated: usize = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
    match truncate_contexts(contexts, estimated, max_tokens) {
        TruncationOutcome::WithinBudget => messages,
        TruncationOutcome::Truncated { .. } => build(contexts),
    }
}
