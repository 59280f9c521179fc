//! HTTP API: sample analysis, record listing, health and metrics

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use health_lib::{
    analysis::AnalysisService,
    error::{AnalysisError, StoreError},
    health::{ComponentStatus, HealthRegistry},
    models::{AnalysisRecord, Classification, ErrorBody},
    observability::render_metrics,
    store::RecordFilter,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: AnalysisService,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(service: AnalysisService, health_registry: HealthRegistry) -> Self {
        Self {
            service,
            health_registry,
        }
    }
}

/// Error response with the `{error, code, details?}` body
#[derive(Debug)]
pub enum ApiError {
    Analysis(AnalysisError),
    Store(StoreError),
    BadQuery(String),
    NotFound(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Analysis(err) => match err {
                AnalysisError::InvalidSample(_) => StatusCode::BAD_REQUEST,
                AnalysisError::ClassificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                AnalysisError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                AnalysisError::UnknownClass(_) | AnalysisError::PersistenceFailed { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Analysis(err) => {
                // The caller learns the classification even though it was not stored
                let details = match err {
                    AnalysisError::PersistenceFailed { classification, .. } => {
                        Some(json!({ "classification": classification }))
                    }
                    AnalysisError::UpstreamTimeout(timeout) => {
                        Some(json!({ "timeout_ms": timeout.as_millis() as u64 }))
                    }
                    _ => None,
                };
                ErrorBody {
                    error: err.to_string(),
                    code: Some(err.kind()),
                    details,
                }
            }
            ApiError::Store(err) => ErrorBody {
                error: err.to_string(),
                code: None,
                details: None,
            },
            ApiError::BadQuery(msg) | ApiError::NotFound(msg) => ErrorBody {
                error: msg.clone(),
                code: None,
                details: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::Analysis(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

/// `POST /analyze`: the body is decoded by the service so malformed JSON
/// is reported like any other invalid sample
async fn analyze(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Classification>, ApiError> {
    let classification = state.service.analyze_payload(&body).await?;
    Ok(Json(classification))
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    filter: Result<Query<RecordFilter>, QueryRejection>,
) -> Result<Json<Vec<AnalysisRecord>>, ApiError> {
    let Query(filter) = filter.map_err(|e| ApiError::BadQuery(e.body_text()))?;
    let records = state.service.store().list(&filter).await?;
    Ok(Json(records))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AnalysisRecord>, ApiError> {
    state
        .service
        .store()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("record {} not found", id)))
}

/// 200 while operational (degraded included), 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    match render_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/api/v1/records", get(list_records))
        .route("/api/v1/records/:id", get(get_record))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting analyzer API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
