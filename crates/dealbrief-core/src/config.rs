use std::time::Duration;

use crate::app_config::{AppConfig, BreakerConfig, RetrievalConfig};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`
/// lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e))
    };

    let parse_ratio = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let value = or_default(var, default)
            .parse::<f64>()
            .map_err(|e| invalid(var, e))?;
        if value <= 0.0 || value > 1.0 {
            return Err(invalid(var, "must be in (0, 1]"));
        }
        Ok(value)
    };

    let content_api_key = require("DEALBRIEF_CONTENT_API_KEY")?;
    let completion_api_key = require("DEALBRIEF_COMPLETION_API_KEY")?;

    let bind_addr = or_default("DEALBRIEF_BIND_ADDR", "0.0.0.0:8000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("DEALBRIEF_BIND_ADDR", e))?;
    let log_level = or_default("DEALBRIEF_LOG_LEVEL", "info");

    let content_api_url = or_default("DEALBRIEF_CONTENT_API_URL", "https://api.exa.ai");
    let tei_url = or_default("DEALBRIEF_TEI_URL", "http://localhost:8080");
    let completion_api_url =
        or_default("DEALBRIEF_COMPLETION_API_URL", "https://api.openai.com/v1");
    let completion_model = or_default("DEALBRIEF_COMPLETION_MODEL", "o3-mini");
    let report_endpoint = or_default(
        "DEALBRIEF_REPORT_ENDPOINT",
        "http://localhost:3000/reports",
    );

    let request_timeout_secs = parse_u64("DEALBRIEF_REQUEST_TIMEOUT_SECS", "60")?;
    let max_retries = parse_u32("DEALBRIEF_MAX_RETRIES", "2")?;
    let retry_backoff_base_ms = parse_u64("DEALBRIEF_RETRY_BACKOFF_BASE_MS", "500")?;
    let step_delay_ms = parse_u64("DEALBRIEF_STEP_DELAY_MS", "500")?;
    let submission_ttl_secs = parse_u64("DEALBRIEF_SUBMISSION_TTL_SECS", "3600")?;

    let retrieval = RetrievalConfig {
        max_iterations: parse_usize("DEALBRIEF_RAG_MAX_ITERATIONS", "6")?,
        queries_per_batch: parse_usize("DEALBRIEF_RAG_QUERIES_PER_BATCH", "8")?,
        docs_per_query: parse_usize("DEALBRIEF_RAG_DOCS_PER_QUERY", "15")?,
        context_window: parse_usize("DEALBRIEF_RAG_CONTEXT_WINDOW", "4000")?,
        chunk_overlap: parse_usize("DEALBRIEF_RAG_CHUNK_OVERLAP", "250")?,
        max_cumulative_context: parse_usize("DEALBRIEF_RAG_MAX_CUMULATIVE_CONTEXT", "50000")?,
        response_token_buffer: parse_usize("DEALBRIEF_RAG_RESPONSE_TOKEN_BUFFER", "15000")?,
        compression_ratio: parse_ratio("DEALBRIEF_RAG_COMPRESSION_RATIO", "0.7")?,
        verification_max_attempts: parse_usize("DEALBRIEF_RAG_VERIFICATION_ATTEMPTS", "2")?,
        verification_coverage_threshold: parse_ratio(
            "DEALBRIEF_RAG_VERIFICATION_COVERAGE",
            "0.9",
        )?,
    };

    if retrieval.chunk_overlap >= retrieval.chunk_size() {
        return Err(invalid(
            "DEALBRIEF_RAG_CHUNK_OVERLAP",
            "must be smaller than context_window * compression_ratio",
        ));
    }

    let breaker = BreakerConfig {
        failure_threshold: parse_usize("DEALBRIEF_BREAKER_FAILURE_THRESHOLD", "5")?.max(1),
        reset_timeout: Duration::from_secs(parse_u64("DEALBRIEF_BREAKER_RESET_TIMEOUT_SECS", "60")?),
        half_open_calls: parse_usize("DEALBRIEF_BREAKER_HALF_OPEN_CALLS", "3")?.max(1),
        window: Duration::from_secs(parse_u64("DEALBRIEF_BREAKER_WINDOW_SECS", "60")?),
    };

    Ok(AppConfig {
        bind_addr,
        log_level,
        content_api_url,
        content_api_key,
        tei_url,
        completion_api_url,
        completion_api_key,
        completion_model,
        report_endpoint,
        request_timeout_secs,
        max_retries,
        retry_backoff_base_ms,
        step_delay_ms,
        submission_ttl_secs,
        retrieval,
        breaker,
    })
}
