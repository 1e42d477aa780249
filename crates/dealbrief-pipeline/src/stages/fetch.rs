use async_trait::async_trait;
use dealbrief_core::BranchKind;

use super::{PROSPECT_FETCH, SELLER_FETCH};
use crate::error::StageError;
use crate::stage::{Stage, StageContext};
use crate::state::{BranchDelta, Submission, SubmissionDelta};

/// Fetches the text of every discovered page.
pub struct Fetch {
    branch: BranchKind,
}

impl Fetch {
    #[must_use]
    pub fn new(branch: BranchKind) -> Self {
        Self { branch }
    }
}

#[async_trait]
impl Stage for Fetch {
    fn name(&self) -> &'static str {
        match self.branch {
            BranchKind::Seller => SELLER_FETCH,
            BranchKind::Prospect => PROSPECT_FETCH,
        }
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let urls = &submission.branch(self.branch).discovered_pages;
        if urls.is_empty() {
            return Err(StageError::Missing(format!(
                "no discovered pages for {} branch",
                self.branch
            )));
        }

        let pages = ctx.content.fetch_pages(urls).await?;
        if pages.is_empty() {
            return Err(StageError::Missing(format!(
                "none of {} pages returned content",
                urls.len()
            )));
        }
        tracing::info!(branch = %self.branch, requested = urls.len(), fetched = pages.len(), "pages fetched");

        Ok(SubmissionDelta::for_branch(
            self.branch,
            BranchDelta {
                pages: Some(pages),
                ..BranchDelta::default()
            },
        ))
    }
}
