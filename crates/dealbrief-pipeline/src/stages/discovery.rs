use std::collections::HashSet;

use async_trait::async_trait;
use dealbrief_core::BranchKind;
use dealbrief_retrieval::parse_list;

use super::{PROSPECT_DISCOVERY, SELLER_DISCOVERY};
use crate::error::StageError;
use crate::stage::{Stage, StageContext};
use crate::state::{BranchDelta, Submission, SubmissionDelta};
use crate::templates;

/// Most pages fetched per site.
pub const MAX_PAGES: usize = 50;

/// Finds a site's public pages; large sites are narrowed to [`MAX_PAGES`]
/// by the completion service.
pub struct Discovery {
    branch: BranchKind,
}

impl Discovery {
    #[must_use]
    pub fn new(branch: BranchKind) -> Self {
        Self { branch }
    }
}

/// Completion-selected pages, restricted to URLs actually discovered. Falls
/// back to the first [`MAX_PAGES`] when selection fails or picks nothing.
async fn select_pages(ctx: &StageContext, company_name: &str, pages: &[String]) -> Vec<String> {
    let fallback = || pages.iter().take(MAX_PAGES).cloned().collect::<Vec<_>>();

    let answer = match ctx
        .completer
        .complete(&templates::page_selection(company_name, pages, MAX_PAGES))
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!(company = company_name, error = %e, "page selection failed, keeping first pages");
            return fallback();
        }
    };

    let parsed = parse_list(&answer);
    let known: HashSet<&str> = pages.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let selected: Vec<String> = parsed
        .items
        .into_iter()
        .filter(|url| known.contains(url.as_str()))
        .filter(|url| seen.insert(url.clone()))
        .take(MAX_PAGES)
        .collect();

    tracing::debug!(
        company = company_name,
        confidence = ?parsed.confidence,
        selected = selected.len(),
        "page selection parsed"
    );
    if selected.is_empty() {
        fallback()
    } else {
        selected
    }
}

#[async_trait]
impl Stage for Discovery {
    fn name(&self) -> &'static str {
        match self.branch {
            BranchKind::Seller => SELLER_DISCOVERY,
            BranchKind::Prospect => PROSPECT_DISCOVERY,
        }
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let url = submission.url(self.branch);
        let pages = ctx.content.discover_pages(url).await?;
        if pages.is_empty() {
            return Err(StageError::Missing(format!("no pages discovered for {url}")));
        }

        let discovered = if pages.len() > MAX_PAGES {
            select_pages(ctx, submission.company_name(self.branch), &pages).await
        } else {
            pages
        };
        tracing::info!(branch = %self.branch, url, pages = discovered.len(), "pages discovered");

        Ok(SubmissionDelta::for_branch(
            self.branch,
            BranchDelta {
                discovered_pages: Some(discovered),
                ..BranchDelta::default()
            },
        ))
    }
}
