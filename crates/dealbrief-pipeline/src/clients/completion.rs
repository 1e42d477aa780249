use async_trait::async_trait;
use dealbrief_resilience::{retry_with_backoff, Guard, ServiceError};
use dealbrief_retrieval::{ChatMessage, Completer};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{http_client, read_json, RetryPolicy};

const BREAKER: &str = "completion";

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    guard: Guard,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    /// # Errors
    ///
    /// Returns [`ServiceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
        guard: Guard,
        retry: RetryPolicy,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            guard,
            retry,
        })
    }

    async fn request(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await?;
        let body: ChatResponse = read_json("completion", "chat/completions", response).await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ServiceError::Empty("completion".to_string()))
    }
}

#[async_trait]
impl Completer for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        self.guard
            .call(BREAKER, || {
                retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
                    self.request(messages)
                })
            })
            .await
    }
}
