use std::net::SocketAddr;
use std::time::Duration;

/// Budgets for one retrieval-augmented report generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub max_iterations: usize,
    pub queries_per_batch: usize,
    pub docs_per_query: usize,
    /// Characters per chunk before compression.
    pub context_window: usize,
    pub chunk_overlap: usize,
    /// Upper bound on prompt tokens sent to the completion service.
    pub max_cumulative_context: usize,
    /// Tokens reserved for the completion's answer.
    pub response_token_buffer: usize,
    pub compression_ratio: f64,
    pub verification_max_attempts: usize,
    pub verification_coverage_threshold: f64,
}

/// Hard ceiling on verification rounds regardless of configuration.
pub const MAX_VERIFICATION_ATTEMPTS: usize = 2;

impl RetrievalConfig {
    /// Total similarity-search calls allowed for a single report.
    #[must_use]
    pub fn max_search_calls(&self) -> usize {
        self.max_iterations.saturating_mul(self.queries_per_batch)
    }

    /// Chunk size in characters: `context_window * compression_ratio`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn chunk_size(&self) -> usize {
        ((self.context_window as f64) * self.compression_ratio).max(1.0) as usize
    }

    /// Token allowance for collected context before the response buffer.
    #[must_use]
    pub fn context_allowance(&self) -> usize {
        self.max_cumulative_context
            .saturating_sub(self.response_token_buffer)
    }

    #[must_use]
    pub fn verification_attempts(&self) -> usize {
        self.verification_max_attempts
            .min(MAX_VERIFICATION_ATTEMPTS)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            queries_per_batch: 8,
            docs_per_query: 15,
            context_window: 4000,
            chunk_overlap: 250,
            max_cumulative_context: 50_000,
            response_token_buffer: 15_000,
            compression_ratio: 0.7,
            verification_max_attempts: 2,
            verification_coverage_threshold: 0.9,
        }
    }
}

/// Thresholds shared by every circuit breaker in the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Failures inside `window` that open the breaker.
    pub failure_threshold: usize,
    /// Time spent open before a half-open probe is allowed.
    pub reset_timeout: Duration,
    /// Consecutive half-open successes needed to close again.
    pub half_open_calls: usize,
    /// Sliding window used to count failures.
    pub window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_calls: 3,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub content_api_url: String,
    pub content_api_key: String,
    pub tei_url: String,
    pub completion_api_url: String,
    pub completion_api_key: String,
    pub completion_model: String,
    /// Base URL; the submission id is appended as the last path segment.
    pub report_endpoint: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub step_delay_ms: u64,
    pub submission_ttl_secs: u64,
    pub retrieval: RetrievalConfig,
    pub breaker: BreakerConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("content_api_url", &self.content_api_url)
            .field("content_api_key", &"[redacted]")
            .field("tei_url", &self.tei_url)
            .field("completion_api_url", &self.completion_api_url)
            .field("completion_api_key", &"[redacted]")
            .field("completion_model", &self.completion_model)
            .field("report_endpoint", &self.report_endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("step_delay_ms", &self.step_delay_ms)
            .field("submission_ttl_secs", &self.submission_ttl_secs)
            .field("retrieval", &self.retrieval)
            .field("breaker", &self.breaker)
            .finish()
    }
}
