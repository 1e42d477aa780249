use async_trait::async_trait;
use dealbrief_core::BranchKind;
use dealbrief_retrieval::{renumber_citations, CitationMap};

use super::COMBINE;
use crate::error::StageError;
use crate::stage::{Stage, StageContext};
use crate::state::{BranchDelta, Submission, SubmissionDelta};
use crate::templates;

/// Joins the prospect sections into one report and compacts its citations.
pub struct Combine;

#[async_trait]
impl Stage for Combine {
    fn name(&self) -> &'static str {
        COMBINE
    }

    async fn execute(
        &self,
        _ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let empty = CitationMap::new();
        let (listing, citations) = submission
            .report_context
            .as_ref()
            .map_or(("", &empty), |rc| (rc.contexts.citations.as_str(), &rc.citations));

        let combined =
            templates::combined_report(&submission.prospect_name, &submission.sections, listing);
        let renumbered = renumber_citations(&combined, citations);
        tracing::info!(
            sections = submission.sections.len(),
            cited = renumbered.outcome.used,
            unresolved = renumbered.outcome.unresolved.len(),
            "prospect report combined"
        );

        Ok(SubmissionDelta::for_branch(
            BranchKind::Prospect,
            BranchDelta {
                report: Some(renumbered.text),
                ..BranchDelta::default()
            },
        ))
    }
}
