use async_trait::async_trait;
use dealbrief_core::{company_name_from_url, namespace_key, BranchKind};
use reqwest::Url;

use super::INITIALIZE;
use crate::error::StageError;
use crate::stage::{Stage, StageContext};
use crate::state::{BranchDelta, Submission, SubmissionDelta};

/// Checks both URLs and derives company names and namespaces. The only
/// fatal stage.
pub struct Initialize;

fn check_url(field: &str, raw: &str) -> Result<(), StageError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| StageError::InvalidInput(format!("{field} {raw:?} is not a URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(StageError::InvalidInput(format!(
            "{field} {raw:?} must be an http(s) URL with a host"
        )));
    }
    Ok(())
}

#[async_trait]
impl Stage for Initialize {
    fn name(&self) -> &'static str {
        INITIALIZE
    }

    fn is_fatal(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        check_url("seller_url", &submission.seller_url)?;
        check_url("prospect_url", &submission.prospect_url)?;

        let branch = |kind: BranchKind| BranchDelta {
            namespace: Some(namespace_key(submission.url(kind), "webpages", kind)),
            ..BranchDelta::default()
        };
        Ok(SubmissionDelta {
            seller_name: Some(company_name_from_url(&submission.seller_url)),
            prospect_name: Some(company_name_from_url(&submission.prospect_url)),
            seller: Some(branch(BranchKind::Seller)),
            prospect: Some(branch(BranchKind::Prospect)),
            ..SubmissionDelta::default()
        })
    }
}
