//! HTTP implementations of the collaborator interfaces.
//!
//! Every outbound call runs through [`dealbrief_resilience::Guard`] (circuit
//! breaker plus metrics) with [`dealbrief_resilience::retry_with_backoff`]
//! underneath, so a call that exhausts its retries counts as one breaker
//! failure.

pub mod completion;
pub mod content;
pub mod embeddings;
pub mod sitemap;

use std::time::Duration;

use dealbrief_resilience::ServiceError;
use reqwest::Client;
use serde::de::DeserializeOwned;

pub use completion::ChatClient;
pub use content::{ContentClient, HttpContentSource};
pub use embeddings::TeiClient;
pub use sitemap::SitemapFetcher;

const USER_AGENT: &str = "dealbrief/0.1 (company-research)";

/// Characters of an error body kept in [`ServiceError::Status`].
const ERROR_BODY_CHARS: usize = 500;

/// Retry policy shared by the collaborator clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, ServiceError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()?)
}

/// Check the status, then parse the body as `T`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &str,
    context: &str,
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ServiceError::Status {
            service: service.to_string(),
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_CHARS).collect(),
        });
    }
    serde_json::from_str(&body).map_err(|e| ServiceError::Deserialize {
        context: context.to_string(),
        source: e,
    })
}
