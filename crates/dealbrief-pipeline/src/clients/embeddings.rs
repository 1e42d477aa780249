//! TEI (Text Embeddings Inference) client for vector generation.

use async_trait::async_trait;
use dealbrief_resilience::{retry_with_backoff, Guard, ServiceError};
use dealbrief_retrieval::Embedder;
use reqwest::Client;
use serde::Serialize;

use super::{http_client, read_json, RetryPolicy};

/// Maximum number of texts per /embed call.
const BATCH_SIZE: usize = 64;

const BREAKER: &str = "embeddings";

/// TEI HTTP client.
pub struct TeiClient {
    client: Client,
    url: String,
    guard: Guard,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

impl TeiClient {
    /// # Errors
    ///
    /// Returns [`ServiceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        tei_url: &str,
        timeout_secs: u64,
        guard: Guard,
        retry: RetryPolicy,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: format!("{}/embed", tei_url.trim_end_matches('/')),
            guard,
            retry,
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest { inputs: batch })
            .send()
            .await?;
        let embeddings: Vec<Vec<f32>> = read_json("tei", "embed", response).await?;

        if embeddings.len() != batch.len() {
            return Err(ServiceError::Status {
                service: "tei".to_string(),
                status: 200,
                body: format!(
                    "returned {} embeddings for {} inputs",
                    embeddings.len(),
                    batch.len()
                ),
            });
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for TeiClient {
    /// Texts are batched into groups of [`BATCH_SIZE`] per request. Returns
    /// one embedding vector per input text, in the same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let embeddings = self
                .guard
                .call(BREAKER, || {
                    retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
                        self.embed_batch(batch)
                    })
                })
                .await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }
}
