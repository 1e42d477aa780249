use async_trait::async_trait;
use dealbrief_retrieval::strip_code_fences;

use super::{budgeted_prompt, NEWS_SECTION, OVERVIEW, POSITIONS, TRENDS_SECTION};
use crate::error::StageError;
use crate::stage::{Stage, StageContext};
use crate::state::{SectionKind, Submission, SubmissionDelta};
use crate::templates;

/// One prospect report section from the shared report context.
pub struct SectionStage {
    kind: SectionKind,
}

impl SectionStage {
    #[must_use]
    pub fn new(kind: SectionKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Stage for SectionStage {
    fn name(&self) -> &'static str {
        match self.kind {
            SectionKind::Overview => OVERVIEW,
            SectionKind::Positions => POSITIONS,
            SectionKind::News => NEWS_SECTION,
            SectionKind::Trends => TRENDS_SECTION,
        }
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let report_context = submission
            .report_context
            .as_ref()
            .ok_or_else(|| StageError::Missing("prospect report context".to_string()))?;

        let seller_report = submission.seller.report.as_deref().unwrap_or_default();
        let mut contexts = report_context.contexts.clone();
        let messages = budgeted_prompt(
            &mut contexts,
            ctx.retrieval.config().context_allowance(),
            |c| {
                templates::section(
                    self.kind,
                    &submission.prospect_name,
                    &submission.seller_name,
                    seller_report,
                    c,
                )
            },
        );
        let answer = ctx.completer.complete(&messages).await?;
        Ok(SubmissionDelta::section(self.kind, strip_code_fences(&answer)))
    }
}
