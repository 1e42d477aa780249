//! Prospect-only signal gathering: news, job listings and industry trends.

use std::collections::HashSet;

use async_trait::async_trait;
use dealbrief_core::{BranchKind, DocumentKind, SourceDocument};
use dealbrief_retrieval::parse_list;
use futures::future::join_all;

use super::{PROSPECT_JOBS, PROSPECT_MACRO_TRENDS, PROSPECT_NEWS};
use crate::error::StageError;
use crate::stage::{Stage, StageContext};
use crate::state::{BranchDelta, Submission, SubmissionDelta};
use crate::templates;

const NEWS_RESULTS: usize = 25;
const TREND_QUERIES: usize = 5;
const RESULTS_PER_TREND_QUERY: usize = 5;
const MAX_JOB_PAGES: usize = 10;

/// Path fragments that mark a careers page.
const JOB_PAGE_HINTS: &[&str] = &["career", "/jobs", "job-openings", "join-us", "work-with-us"];
/// Tried when no discovered page looks like a careers page.
const GUESSED_JOB_PATHS: &[&str] = &["careers", "jobs"];

/// `https://www.acme.com/about` → `acme.com`.
fn search_host(url: &str) -> String {
    url.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn dedup_by_url(docs: impl IntoIterator<Item = SourceDocument>) -> Vec<SourceDocument> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|d| seen.insert(d.url().to_string()))
        .collect()
}

fn prospect(delta: BranchDelta) -> SubmissionDelta {
    SubmissionDelta::for_branch(BranchKind::Prospect, delta)
}

/// Keyword news search for the prospect's domain over the last year.
pub struct News;

#[async_trait]
impl Stage for News {
    fn name(&self) -> &'static str {
        PROSPECT_NEWS
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let host = search_host(&submission.prospect_url);
        let news = ctx
            .content
            .search(&host, DocumentKind::News, NEWS_RESULTS)
            .await?;
        let news = dedup_by_url(news);
        tracing::info!(query = %host, results = news.len(), "news collected");
        Ok(prospect(BranchDelta {
            news: Some(news),
            ..BranchDelta::default()
        }))
    }
}

/// Careers pages of the prospect's own site, tagged as job documents.
pub struct Jobs;

fn job_page_candidates(site_url: &str, discovered: &[String]) -> Vec<String> {
    let found: Vec<String> = discovered
        .iter()
        .filter(|url| {
            let lower = url.to_lowercase();
            JOB_PAGE_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .take(MAX_JOB_PAGES)
        .cloned()
        .collect();
    if !found.is_empty() {
        return found;
    }
    let base = site_url.trim_end_matches('/');
    GUESSED_JOB_PATHS
        .iter()
        .map(|path| format!("{base}/{path}"))
        .collect()
}

#[async_trait]
impl Stage for Jobs {
    fn name(&self) -> &'static str {
        PROSPECT_JOBS
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let candidates =
            job_page_candidates(&submission.prospect_url, &submission.prospect.discovered_pages);
        let pages = ctx.content.fetch_pages(&candidates).await?;
        let jobs: Vec<SourceDocument> = dedup_by_url(pages.into_iter().map(|page| {
            let SourceDocument { content, meta } = page;
            let doc = SourceDocument::new(content, meta.url, meta.title, DocumentKind::Job);
            match meta.published_date {
                Some(date) => doc.with_published_date(date),
                None => doc,
            }
        }));
        tracing::info!(candidates = candidates.len(), job_pages = jobs.len(), "job pages collected");
        Ok(prospect(BranchDelta {
            jobs: Some(jobs),
            ..BranchDelta::default()
        }))
    }
}

/// Industry identification, then a handful of trend searches.
pub struct MacroTrends;

fn clean_queries(answer: &str) -> Vec<String> {
    let parsed = parse_list(answer);
    let mut seen = HashSet::new();
    parsed
        .items
        .into_iter()
        .map(|q| q.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.clone()))
        .take(TREND_QUERIES)
        .collect()
}

#[async_trait]
impl Stage for MacroTrends {
    fn name(&self) -> &'static str {
        PROSPECT_MACRO_TRENDS
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        let industry = ctx
            .completer
            .complete(&templates::industry(&submission.prospect_url))
            .await?;
        let industry = industry.trim();
        let answer = ctx
            .completer
            .complete(&templates::trend_queries(industry, TREND_QUERIES))
            .await?;
        let queries = clean_queries(&answer);
        if queries.is_empty() {
            return Err(StageError::Missing("no trend queries generated".to_string()));
        }

        let searches = queries.iter().map(|q| {
            ctx.content
                .search(q, DocumentKind::MacroTrend, RESULTS_PER_TREND_QUERY)
        });
        let mut trends = Vec::new();
        for (query, result) in queries.iter().zip(join_all(searches).await) {
            match result {
                Ok(docs) => trends.extend(docs),
                Err(e) => tracing::warn!(query = %query, error = %e, "trend search failed, skipping"),
            }
        }
        let trends = dedup_by_url(trends);
        tracing::info!(industry, queries = queries.len(), results = trends.len(), "macro trends collected");

        Ok(prospect(BranchDelta {
            macro_trends: Some(trends),
            ..BranchDelta::default()
        }))
    }
}
