//! In-memory collaborators for stage and engine tests.

use std::sync::Arc;

use async_trait::async_trait;
use dealbrief_core::{DocumentKind, RetrievalConfig, SourceDocument};
use dealbrief_resilience::ServiceError;
use dealbrief_retrieval::{ChatMessage, Completer, Embedder, RetrievalEngine};

use crate::source::ContentSource;
use crate::stage::StageContext;

/// Three pages per site; searches return two hits tagged with the
/// requested kind.
#[derive(Default)]
pub(crate) struct FakeContent {
    pub fail_search: bool,
    pub fail_discovery: bool,
}

fn slug(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[async_trait]
impl ContentSource for FakeContent {
    async fn discover_pages(&self, site_url: &str) -> Result<Vec<String>, ServiceError> {
        if self.fail_discovery {
            return Err(ServiceError::Empty(format!("page discovery for {site_url}")));
        }
        let base = site_url.trim_end_matches('/');
        Ok(vec![
            format!("{base}/"),
            format!("{base}/about"),
            format!("{base}/careers"),
        ])
    }

    async fn fetch_pages(&self, urls: &[String]) -> Result<Vec<SourceDocument>, ServiceError> {
        Ok(urls
            .iter()
            .map(|url| {
                SourceDocument::new(
                    format!("{url} describes products, pricing and customers."),
                    url.clone(),
                    "Page",
                    DocumentKind::Webpage,
                )
            })
            .collect())
    }

    async fn search(
        &self,
        query: &str,
        kind: DocumentKind,
        limit: usize,
    ) -> Result<Vec<SourceDocument>, ServiceError> {
        if self.fail_search {
            return Err(ServiceError::CircuitOpen("content_search".to_string()));
        }
        Ok((1..=limit.min(2))
            .map(|i| {
                SourceDocument::new(
                    format!("{query} update number {i}."),
                    format!("https://news.example/{}/{i}", slug(query)),
                    format!("{query} {i}"),
                    kind,
                )
                .with_published_date("2025-01-15")
            })
            .collect())
    }
}

/// Answers by recognising the developer message of each prompt.
pub(crate) struct FakeCompleter;

fn answer_for(system: &str) -> Result<String, ServiceError> {
    let answer = if system.contains("industries") {
        "Retail analytics software."
    } else if system.contains("market research analyst") {
        "retail analytics trends, \"retail AI adoption\""
    } else if system.contains("adaptive research strategist") {
        "1. What does the company sell?\n2. Who buys it?"
    } else if system.contains("content completeness validator") {
        "COMPLETE"
    } else if system.contains("content coverage analyst") {
        "Value proposition: covered\nProduct capabilities: covered\n\
         Market differentiation: covered\nCustomer outcomes: covered"
    } else if system.contains("sales intelligence writer") {
        "```markdown\n## Findings\nThey sell analytics [2]. Customers grow [1].\n\n## Citations\n[1]. old\n```"
    } else if system.contains("select the web pages") {
        "[]"
    } else {
        return Err(ServiceError::Empty("completion".to_string()));
    };
    Ok(answer.to_string())
}

#[async_trait]
impl Completer for FakeCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let system = messages.first().map_or("", |m| m.content.as_str());
        answer_for(system)
    }
}

/// Letter-frequency vectors: deterministic and never all-zero.
pub(crate) struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.01_f32; 26];
                for c in text.chars().filter(char::is_ascii_lowercase) {
                    v[(c as usize) - ('a' as usize)] += 1.0;
                }
                v
            })
            .collect())
    }
}

pub(crate) fn context_with(content: FakeContent) -> StageContext {
    let completer: Arc<dyn Completer> = Arc::new(FakeCompleter);
    StageContext {
        content: Arc::new(content),
        completer: Arc::clone(&completer),
        retrieval: RetrievalEngine::new(
            RetrievalConfig::default(),
            Arc::new(FakeEmbedder),
            completer,
        ),
    }
}

pub(crate) fn context() -> StageContext {
    context_with(FakeContent::default())
}
