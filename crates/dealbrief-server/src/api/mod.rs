use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use dealbrief_pipeline::{PipelineEngine, PipelineError, SubmissionInput};
use dealbrief_resilience::{BreakerStatus, Guard, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::hub::{HubError, ProgressHub, SubmissionHealth};
use crate::middleware::{request_id, RequestId};
use crate::runner::Runner;
use crate::ws::ws_progress;

#[derive(Clone)]
pub struct AppState {
    pub hub: ProgressHub,
    pub engine: Arc<PipelineEngine>,
    pub runner: Runner,
    pub guard: Guard,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ResponseMeta {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" | "duplicate_submission" => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub submission_id: String,
    pub company_url: String,
    pub target_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission_id: String,
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthData {
    status: &'static str,
    timestamp: DateTime<Utc>,
    active_submissions: usize,
    per_submission_detail: BTreeMap<String, SubmissionHealth>,
    metrics: BTreeMap<String, MetricsSnapshot>,
    breakers: BTreeMap<String, BreakerStatus>,
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/ws/{submission_id}", get(ws_progress))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

/// `POST /submit`: validate, register with the hub and start the run in the
/// background.
async fn submit(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let input = SubmissionInput {
        submission_id: body.submission_id.clone(),
        seller_url: body.company_url,
        prospect_url: body.target_url,
    };
    tracing::info!(
        submission_id = %input.submission_id,
        company_url = %input.seller_url,
        target_url = %input.prospect_url,
        "submission received"
    );

    let run = state.engine.run(input).map_err(|e| match e {
        PipelineError::InvalidInput(_) => {
            ApiError::new(req_id.0.clone(), "validation_error", e.to_string())
        }
        other => {
            tracing::error!(error = %other, "pipeline could not start");
            ApiError::new(req_id.0.clone(), "internal_error", "pipeline could not start")
        }
    })?;

    state
        .hub
        .start_submission(&body.submission_id)
        .await
        .map_err(|e| match e {
            HubError::DuplicateSubmission(_) => {
                ApiError::new(req_id.0.clone(), "duplicate_submission", e.to_string())
            }
            other => ApiError::new(req_id.0.clone(), "internal_error", other.to_string()),
        })?;

    let runner = state.runner.clone();
    tokio::spawn(async move { runner.run_submission(run).await });

    Ok(Json(SubmitResponse {
        submission_id: body.submission_id,
        status: "processing",
        started_at: Utc::now(),
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.hub.health().await;
    Json(HealthData {
        status: "healthy",
        timestamp: Utc::now(),
        active_submissions: hub.active_submissions,
        per_submission_detail: hub.per_submission_detail,
        metrics: state.guard.metrics.all(),
        breakers: state.guard.breakers.status(),
    })
}
