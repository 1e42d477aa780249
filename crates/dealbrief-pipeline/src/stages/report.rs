use async_trait::async_trait;
use dealbrief_core::BranchKind;
use dealbrief_retrieval::{
    build_contexts, focus_areas, renumber_citations, strip_code_fences, Retrieval,
    RetrievalRequest,
};

use super::{budgeted_prompt, PROSPECT_REPORT_ASSEMBLY, SELLER_REPORT};
use crate::error::StageError;
use crate::stage::{Stage, StageContext};
use crate::state::{BranchDelta, ReportContext, Submission, SubmissionDelta};
use crate::templates;

async fn retrieve_branch(
    ctx: &StageContext,
    submission: &Submission,
    branch: BranchKind,
) -> Result<Retrieval, StageError> {
    let documents = submission.branch(branch).all_documents();
    if documents.is_empty() {
        return Err(StageError::Missing(format!("no documents for {branch} branch")));
    }
    let company_name = submission.company_name(branch).to_string();
    let queries = focus_areas(branch);
    let verification_prompt = Some(templates::verification_prompt(&company_name, &queries));
    Ok(ctx
        .retrieval
        .retrieve(RetrievalRequest {
            branch,
            company_name,
            documents,
            queries,
            verification_prompt,
        })
        .await?)
}

/// Retrieval, coverage verification and one completion for the seller's
/// value proposition.
pub struct SellerReport;

#[async_trait]
impl Stage for SellerReport {
    fn name(&self) -> &'static str {
        SELLER_REPORT
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let mut retrieval = retrieve_branch(ctx, submission, BranchKind::Seller).await?;
        let required: Vec<String> = templates::SELLER_REQUIRED_SECTIONS
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let verification = ctx.retrieval.apply_verification(&mut retrieval, &required).await;
        tracing::info!(
            coverage = verification.coverage_ratio,
            rounds = verification.rounds,
            added = verification.added,
            "seller coverage verified"
        );

        let company_name = &submission.seller_name;
        let mut contexts = build_contexts(&retrieval.documents, &retrieval.citations);
        let messages = budgeted_prompt(
            &mut contexts,
            ctx.retrieval.config().context_allowance(),
            |c| templates::seller_report(company_name, c),
        );
        let answer = ctx.completer.complete(&messages).await?;

        let renumbered = renumber_citations(&strip_code_fences(&answer), &retrieval.citations);
        if !renumbered.outcome.is_clean() {
            tracing::warn!(
                section_found = renumbered.outcome.section_found,
                unresolved = ?renumbered.outcome.unresolved,
                "seller report citations not fully resolved"
            );
        }

        Ok(SubmissionDelta::for_branch(
            BranchKind::Seller,
            BranchDelta {
                report: Some(renumbered.text),
                citations: Some(retrieval.citations),
                ..BranchDelta::default()
            },
        ))
    }
}

/// Retrieval over every prospect document; the section stages share the
/// resulting contexts.
pub struct ProspectReportAssembly;

#[async_trait]
impl Stage for ProspectReportAssembly {
    fn name(&self) -> &'static str {
        PROSPECT_REPORT_ASSEMBLY
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let retrieval = retrieve_branch(ctx, submission, BranchKind::Prospect).await?;
        let contexts = build_contexts(&retrieval.documents, &retrieval.citations);
        tracing::info!(
            documents = retrieval.documents.len(),
            citations = contexts.citation_count,
            search_calls = retrieval.search_calls,
            "prospect contexts assembled"
        );

        Ok(SubmissionDelta {
            prospect: Some(BranchDelta {
                citations: Some(retrieval.citations.clone()),
                ..BranchDelta::default()
            }),
            report_context: Some(ReportContext {
                contexts,
                citations: retrieval.citations,
            }),
            ..SubmissionDelta::default()
        })
    }
}
