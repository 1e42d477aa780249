mod api;
mod delivery;
mod hub;
mod middleware;
mod runner;
mod ws;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use dealbrief_pipeline::clients::{
    ChatClient, ContentClient, HttpContentSource, RetryPolicy, SitemapFetcher, TeiClient,
};
use dealbrief_pipeline::{default_stage_table, PipelineEngine, StageContext};
use dealbrief_resilience::Guard;
use dealbrief_retrieval::{Completer, Embedder, RetrievalEngine};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    delivery::ReportDelivery,
    hub::{spawn_sweeper, ProgressHub},
    runner::Runner,
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(dealbrief_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let guard = Guard::new(config.breaker.clone());
    let retry = RetryPolicy {
        max_retries: config.max_retries,
        backoff_base_ms: config.retry_backoff_base_ms,
    };
    let timeout = config.request_timeout_secs;

    let content = ContentClient::new(
        &config.content_api_url,
        &config.content_api_key,
        timeout,
        guard.clone(),
        retry,
    )?;
    let completer: Arc<dyn Completer> = Arc::new(ChatClient::new(
        &config.completion_api_url,
        &config.completion_api_key,
        &config.completion_model,
        timeout,
        guard.clone(),
        retry,
    )?);
    let embedder: Arc<dyn Embedder> =
        Arc::new(TeiClient::new(&config.tei_url, timeout, guard.clone(), retry)?);

    let context = StageContext {
        content: Arc::new(HttpContentSource::new(content, SitemapFetcher::new(timeout)?)),
        completer: Arc::clone(&completer),
        retrieval: RetrievalEngine::new(config.retrieval.clone(), embedder, completer),
    };
    let engine = PipelineEngine::new(&default_stage_table()?, context)?;
    tracing::info!(stages = ?engine.stage_names(), "pipeline ready");

    let hub = ProgressHub::new(Duration::from_secs(config.submission_ttl_secs));
    let _sweeper = spawn_sweeper(hub.clone(), SWEEP_INTERVAL);

    let delivery = ReportDelivery::new(&config.report_endpoint, timeout, guard.clone())?;
    let runner = Runner::new(
        hub.clone(),
        Arc::new(delivery),
        Duration::from_millis(config.step_delay_ms),
    );

    let app = build_app(AppState {
        hub,
        engine: Arc::new(engine),
        runner,
        guard,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
