use async_trait::async_trait;
use dealbrief_core::{DocumentKind, SourceDocument};
use dealbrief_resilience::ServiceError;

/// Web content collaborator: page discovery, bulk fetch and search.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Public page URLs of the site rooted at `site_url`, deduplicated.
    async fn discover_pages(&self, site_url: &str) -> Result<Vec<String>, ServiceError>;

    /// Fetch the text of `urls` as webpage documents. Pages that come back
    /// without text are omitted.
    async fn fetch_pages(&self, urls: &[String]) -> Result<Vec<SourceDocument>, ServiceError>;

    /// Search the web; results are tagged with `kind`. News and macro-trend
    /// searches are limited to the last twelve months.
    async fn search(
        &self,
        query: &str,
        kind: DocumentKind,
        limit: usize,
    ) -> Result<Vec<SourceDocument>, ServiceError>;
}
