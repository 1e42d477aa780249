//! Client for an Exa-style content API (`/search`, `/contents`) and the
//! [`ContentSource`] built on top of it.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use dealbrief_core::{DocumentKind, SourceDocument};
use dealbrief_resilience::{guarded_call, retry_with_backoff, Guard, ServiceError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::sitemap::SitemapFetcher;
use super::{http_client, read_json, RetryPolicy};
use crate::source::ContentSource;

/// URLs per `/contents` request.
const CONTENTS_BATCH_SIZE: usize = 100;
/// Links requested from a homepage when no sitemap exists.
const HOMEPAGE_LINKS: usize = 100;
/// Window for news and macro-trend searches.
const RECENT_DAYS: i64 = 365;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    search_type: &'static str,
    num_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_published_date: Option<String>,
    contents: TextOption,
}

#[derive(Serialize)]
struct TextOption {
    text: bool,
}

#[derive(Serialize)]
struct ContentsRequest<'a> {
    urls: &'a [String],
    text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    extras: Option<Extras>,
}

#[derive(Serialize)]
struct Extras {
    links: usize,
}

#[derive(Debug, Deserialize)]
struct ResultsEnvelope {
    #[serde(default)]
    results: Vec<ContentResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    extras: Option<ResultExtras>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultExtras {
    #[serde(default)]
    links: Vec<String>,
}

impl ContentResult {
    /// `None` when the result has no text or no usable URL.
    fn into_document(self, kind: DocumentKind) -> Option<SourceDocument> {
        let url = self.url.or(self.id).filter(|u| !u.is_empty())?;
        let text = self.text.filter(|t| !t.trim().is_empty())?;
        let doc = SourceDocument::new(text, url, self.title.unwrap_or_default(), kind);
        Some(match self.published_date {
            Some(date) => doc.with_published_date(date),
            None => doc,
        })
    }
}

/// HTTP client for the content API.
pub struct ContentClient {
    client: Client,
    base_url: String,
    api_key: String,
    guard: Guard,
    retry: RetryPolicy,
}

impl ContentClient {
    /// # Errors
    ///
    /// Returns [`ServiceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout_secs: u64,
        guard: Guard,
        retry: RetryPolicy,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_owned(),
            guard,
            retry,
        })
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResultsEnvelope, ServiceError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        read_json("content", path, response).await
    }

    async fn post_retrying<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResultsEnvelope, ServiceError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            self.post(path, body)
        })
        .await
    }

    /// Keyword search. While the `content_search` breaker is open this
    /// returns no results instead of failing.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the search was attempted and failed.
    pub async fn search(
        &self,
        query: &str,
        kind: DocumentKind,
        limit: usize,
    ) -> Result<Vec<SourceDocument>, ServiceError> {
        let recent = matches!(kind, DocumentKind::News | DocumentKind::MacroTrend);
        let request = SearchRequest {
            query,
            search_type: "keyword",
            num_results: limit,
            category: recent.then_some("news"),
            start_published_date: recent.then(|| {
                (Utc::now() - TimeDelta::days(RECENT_DAYS))
                    .format("%Y-%m-%d")
                    .to_string()
            }),
            contents: TextOption { text: true },
        };

        let envelope = guarded_call(
            &self.guard,
            "content_search",
            ResultsEnvelope { results: vec![] },
            || self.post_retrying("search", &request),
        )
        .await?;

        Ok(envelope
            .results
            .into_iter()
            .filter_map(|r| r.into_document(kind))
            .collect())
    }

    /// Page text for `urls`, in batches.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if any batch fails.
    pub async fn contents(&self, urls: &[String]) -> Result<Vec<SourceDocument>, ServiceError> {
        let mut documents = Vec::with_capacity(urls.len());
        for batch in urls.chunks(CONTENTS_BATCH_SIZE) {
            let request = ContentsRequest {
                urls: batch,
                text: true,
                extras: None,
            };
            let envelope = self
                .guard
                .call("content_fetch", || self.post_retrying("contents", &request))
                .await?;
            documents.extend(
                envelope
                    .results
                    .into_iter()
                    .filter_map(|r| r.into_document(DocumentKind::Webpage)),
            );
            tracing::debug!(batch = batch.len(), total = documents.len(), "fetched content batch");
        }
        Ok(documents)
    }

    /// Absolute `http(s)` links found on `url`, deduplicated in page order.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request fails.
    pub async fn links(&self, url: &str) -> Result<Vec<String>, ServiceError> {
        let urls = [url.to_string()];
        let request = ContentsRequest {
            urls: &urls,
            text: true,
            extras: Some(Extras {
                links: HOMEPAGE_LINKS,
            }),
        };
        let envelope = guarded_call(
            &self.guard,
            "content_links",
            ResultsEnvelope { results: vec![] },
            || self.post_retrying("contents", &request),
        )
        .await?;

        let raw = envelope
            .results
            .into_iter()
            .next()
            .and_then(|r| r.extras)
            .unwrap_or_default()
            .links;
        Ok(dedup_http_links(raw))
    }
}

fn dedup_http_links(links: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|l| l.starts_with("http://") || l.starts_with("https://"))
        .filter(|l| seen.insert(l.clone()))
        .collect()
}

/// [`ContentSource`] backed by sitemap probing and the content API.
pub struct HttpContentSource {
    content: ContentClient,
    sitemaps: SitemapFetcher,
}

impl HttpContentSource {
    #[must_use]
    pub fn new(content: ContentClient, sitemaps: SitemapFetcher) -> Self {
        Self { content, sitemaps }
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn discover_pages(&self, site_url: &str) -> Result<Vec<String>, ServiceError> {
        let urls = match self.sitemaps.discover(site_url).await {
            Some(urls) => urls,
            None => {
                tracing::info!(site_url, "no sitemap found, using homepage links");
                self.content.links(site_url).await?
            }
        };
        let pages = dedup_http_links(urls);
        if pages.is_empty() {
            return Err(ServiceError::Empty(format!("page discovery for {site_url}")));
        }
        Ok(pages)
    }

    async fn fetch_pages(&self, urls: &[String]) -> Result<Vec<SourceDocument>, ServiceError> {
        self.content.contents(urls).await
    }

    async fn search(
        &self,
        query: &str,
        kind: DocumentKind,
        limit: usize,
    ) -> Result<Vec<SourceDocument>, ServiceError> {
        self.content.search(query, kind, limit).await
    }
}
